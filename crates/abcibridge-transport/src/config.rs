use abcibridge_frame::DEFAULT_MAX_MESSAGE_SIZE;

/// Tendermint's default `proxy_app` port.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:26658";

/// Application identity stamped on envelopes when none is configured.
pub const DEFAULT_TARGET: &str = "abci";

/// What to do when a second peer connects while one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerPolicy {
    /// Close the active connection and serve the newcomer.
    ///
    /// A node that crashed and restarted may leave a half-open socket behind;
    /// its reconnection must win.
    #[default]
    Replace,
    /// Keep the active connection and close the newcomer immediately.
    Reject,
}

/// Configuration for [`TcpServerChannel`](crate::TcpServerChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// `host:port` to listen on.
    pub listen_addr: String,
    /// Application identity attached to every decoded request.
    pub target: String,
    /// Largest accepted message body in either direction.
    pub max_message_size: usize,
    /// Request queue capacity. `None` is unbounded; a bounded queue pauses
    /// socket reads while full.
    pub queue_capacity: Option<usize>,
    /// Second-peer policy.
    pub peer_policy: PeerPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            target: DEFAULT_TARGET.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            queue_capacity: None,
            peer_policy: PeerPolicy::default(),
        }
    }
}

impl ChannelConfig {
    /// Listen on an explicit host and port.
    pub fn with_address(mut self, host: &str, port: u16) -> Self {
        self.listen_addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        self
    }

    /// Override the listen address (`host:port`).
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Override the application identity.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Override the maximum message size.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Bound the request queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Override the second-peer policy.
    pub fn with_peer_policy(mut self, policy: PeerPolicy) -> Self {
        self.peer_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_address_brackets_ipv6_hosts() {
        let cfg = ChannelConfig::default().with_address("::1", 26658);
        assert_eq!(cfg.listen_addr, "[::1]:26658");

        let cfg = ChannelConfig::default().with_address("0.0.0.0", 9000);
        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cfg = ChannelConfig::default().with_queue_capacity(0);
        assert_eq!(cfg.queue_capacity, Some(1));
    }

    #[test]
    fn defaults_match_tendermint_proxy_app() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(cfg.peer_policy, PeerPolicy::Replace);
        assert!(cfg.queue_capacity.is_none());
    }
}
