use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use abcibridge_node::{GenesisDefaults, NodeConfig, NodeParams, NodeStatus, NodeSupervisor};
use abcibridge_transport::{ChannelConfig, ChannelError, Envelope, TcpServerChannel};
use tracing::{info, warn};

use crate::error::{ConnectionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Idle,
    Connected,
    Closed,
}

/// A node process and the server channel it talks to, managed as one unit.
pub struct ServerConnection {
    node: tokio::sync::Mutex<NodeSupervisor>,
    channel: TcpServerChannel,
    state: Mutex<ConnectionState>,
}

impl ServerConnection {
    pub fn new(node: NodeSupervisor, channel: TcpServerChannel) -> Self {
        Self {
            node: tokio::sync::Mutex::new(node),
            channel,
            state: Mutex::new(ConnectionState::Idle),
        }
    }

    /// Build the node supervisor and channel from their configurations.
    pub fn from_config(params: NodeParams, node: NodeConfig, channel: ChannelConfig) -> Self {
        Self::new(
            NodeSupervisor::new(params, node),
            TcpServerChannel::new(channel),
        )
    }

    /// Start the node, then the channel.
    ///
    /// If the channel cannot start, the node is stopped again and the channel
    /// error is returned. Returns the channel's bound address.
    pub async fn connect(&self) -> Result<SocketAddr> {
        let mut node = self.node.lock().await;
        match *lock(&self.state) {
            ConnectionState::Idle => {}
            ConnectionState::Connected => return Err(ChannelError::AlreadyListening.into()),
            ConnectionState::Closed => return Err(ChannelError::Terminated.into()),
        }

        node.start().await?;

        let local_addr = match self.channel.connect().await {
            Ok(addr) => addr,
            Err(err) => {
                warn!(%err, "channel failed to start, stopping node");
                if let Err(stop_err) = node.stop().await {
                    warn!(err = %stop_err, "failed to stop node after channel failure");
                }
                return Err(err.into());
            }
        };

        *lock(&self.state) = ConnectionState::Connected;
        info!(%local_addr, pid = ?node.pid(), "server connection up");
        Ok(local_addr)
    }

    /// Stop the channel, then the node.
    ///
    /// Both steps always run; the first failure is returned. Calling this
    /// again is a no-op. A `connect` in progress completes first and is then
    /// torn down.
    pub async fn disconnect(&self) -> Result<()> {
        let mut node = self.node.lock().await;
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Connected {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }

        let mut first_error: Option<ConnectionError> = None;
        if let Err(err) = self.channel.disconnect().await {
            warn!(%err, "channel did not shut down cleanly");
            first_error.get_or_insert(err.into());
        }
        if let Err(err) = node.stop().await {
            warn!(%err, "node did not shut down cleanly");
            first_error.get_or_insert(err.into());
        }

        info!("server connection down");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop and start the node process; the channel keeps listening.
    pub async fn restart_node(&self) -> Result<()> {
        let mut node = self.node.lock().await;
        self.ensure_connected()?;
        node.restart().await?;
        Ok(())
    }

    /// Hard reset the node: stop, prune blocks, reset genesis, start.
    ///
    /// See [`NodeSupervisor::hard_reset`]. The channel keeps listening and the
    /// restarted node reconnects to it.
    pub async fn hard_reset_node(
        &self,
        genesis_time: Option<String>,
        app_hash: Option<String>,
    ) -> Result<GenesisDefaults> {
        let mut node = self.node.lock().await;
        self.ensure_connected()?;
        Ok(node.hard_reset(genesis_time, app_hash).await?)
    }

    /// Write a response to the node.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        Ok(self.channel.send(envelope).await?)
    }

    /// Next request from the node, or `None` once the connection is closed.
    pub async fn receive(&self) -> Option<Envelope> {
        self.channel.get_message().await
    }

    fn ensure_connected(&self) -> Result<()> {
        match *lock(&self.state) {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Idle => Err(ChannelError::NotConnected.into()),
            ConnectionState::Closed => Err(ChannelError::Terminated.into()),
        }
    }

    pub fn is_connected(&self) -> bool {
        *lock(&self.state) == ConnectionState::Connected
    }

    pub fn channel(&self) -> &TcpServerChannel {
        &self.channel
    }

    pub async fn node_status(&self) -> NodeStatus {
        self.node.lock().await.status()
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("channel", &self.channel)
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use abcibridge_frame::{frame_message, MessageKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    // Serializes script creation and spawning (ETXTBSY).
    static PROCESS_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    fn connection(dir: &Path, script: &str, channel: ChannelConfig) -> ServerConnection {
        let binary = dir.join("fake-node");
        std::fs::write(&binary, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        ServerConnection::from_config(
            NodeParams::new(dir.join("home")),
            NodeConfig::default()
                .with_binary(binary)
                .with_startup_grace(Duration::from_millis(100))
                .with_stop_timeout(Duration::from_millis(500)),
            channel,
        )
    }

    fn loopback() -> ChannelConfig {
        ChannelConfig::default().with_listen_addr("127.0.0.1:0")
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(dir.path(), "exec sleep 30", loopback());

        let addr = conn.connect().await.unwrap();
        assert!(conn.is_connected());
        assert!(matches!(conn.node_status().await, NodeStatus::Running { .. }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        let echo = MessageKind::Echo.wrap_request(b"\x0a\x02hi").unwrap();
        client.write_all(&frame_message(&echo)).await.unwrap();

        let request = tokio::time::timeout(Duration::from_secs(5), conn.receive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.kind, MessageKind::Echo);

        let response = MessageKind::Echo.wrap_response(b"\x0a\x02hi").unwrap();
        conn.send(request.reply(response.clone())).await.unwrap();

        let expected = frame_message(&response);
        let mut received = vec![0u8; expected.len()];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected.as_ref());

        conn.disconnect().await.unwrap();
        assert!(!conn.is_connected());
        assert_eq!(conn.node_status().await, NodeStatus::Stopped);
        assert!(conn.receive().await.is_none());
    }

    #[tokio::test]
    async fn channel_failure_stops_started_node() {
        let _guard = PROCESS_LOCK.lock().await;
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let conn = connection(
            dir.path(),
            "exec sleep 30",
            ChannelConfig::default().with_listen_addr(addr.to_string()),
        );

        let err = conn.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Channel(ChannelError::Bind { .. })
        ));
        assert!(!conn.is_connected());
        assert_eq!(conn.node_status().await, NodeStatus::Stopped);
    }

    #[tokio::test]
    async fn node_failure_leaves_channel_stopped() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(dir.path(), "exit 1", loopback());

        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Node(_)));
        assert!(conn.channel().is_stopped());
        assert!(conn.channel().local_addr().is_none());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_final() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(dir.path(), "exec sleep 30", loopback());

        conn.disconnect().await.unwrap();

        conn.connect().await.unwrap();
        assert!(matches!(
            conn.connect().await,
            Err(ConnectionError::Channel(ChannelError::AlreadyListening))
        ));

        conn.disconnect().await.unwrap();
        conn.disconnect().await.unwrap();
        assert!(matches!(
            conn.connect().await,
            Err(ConnectionError::Channel(ChannelError::Terminated))
        ));
    }

    #[tokio::test]
    async fn disconnect_during_connect_tears_down_both() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("fake-node");
        std::fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        let conn = std::sync::Arc::new(ServerConnection::from_config(
            NodeParams::new(dir.path().join("home")),
            NodeConfig::default()
                .with_binary(binary)
                .with_startup_grace(Duration::from_millis(400))
                .with_stop_timeout(Duration::from_millis(500)),
            loopback(),
        ));

        let connecting = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        conn.disconnect().await.unwrap();
        connecting.await.unwrap().unwrap();

        assert!(!conn.is_connected());
        assert!(conn.channel().is_stopped());
        assert_eq!(conn.node_status().await, NodeStatus::Stopped);
    }

    #[tokio::test]
    async fn node_restarts_keep_channel_listening() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(
            dir.path(),
            "[ \"$1\" = node ] && exec sleep 30\nexit 0",
            loopback(),
        );
        assert!(matches!(
            conn.restart_node().await,
            Err(ConnectionError::Channel(ChannelError::NotConnected))
        ));

        let config_dir = dir.path().join("home").join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("genesis.json"),
            r#"{"genesis_time": "2022-01-01T00:00:00Z", "app_hash": "aa"}"#,
        )
        .unwrap();

        let addr = conn.connect().await.unwrap();
        conn.restart_node().await.unwrap();
        let applied = conn
            .hard_reset_node(Some("2023-03-03T00:00:00Z".to_string()), None)
            .await
            .unwrap();
        assert_eq!(applied.app_hash.as_deref(), Some("aa"));
        assert!(matches!(conn.node_status().await, NodeStatus::Running { .. }));
        assert_eq!(conn.channel().local_addr(), Some(addr));
        assert!(!conn.channel().is_stopped());

        conn.disconnect().await.unwrap();
        assert!(matches!(
            conn.hard_reset_node(None, None).await,
            Err(ConnectionError::Channel(ChannelError::Terminated))
        ));
    }

    #[tokio::test]
    async fn disconnect_releases_pending_receive() {
        let _guard = PROCESS_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let conn = std::sync::Arc::new(connection(dir.path(), "exec sleep 30", loopback()));
        conn.connect().await.unwrap();

        let pending = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        conn.disconnect().await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }
}
