use std::fmt;
use std::io;

use abcibridge_connection::ConnectionError;
use abcibridge_frame::FrameError;
use abcibridge_node::NodeError;
use abcibridge_transport::ChannelError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const NODE_ERROR: i32 = 20;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::MessageTooLarge { .. } | FrameError::VarintOverflow => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Bind { source, .. } | ChannelError::Io(source) => io_error(context, source),
        ChannelError::Frame(err) => frame_error(context, err),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn node_error(context: &str, err: NodeError) -> CliError {
    match err {
        NodeError::InvalidJson { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        NodeError::Io(source) => io_error(context, source),
        other => CliError::new(NODE_ERROR, format!("{context}: {other}")),
    }
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Node(err) => node_error(context, err),
        ConnectionError::Channel(err) => channel_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_conflict_is_transport_error() {
        let err = ChannelError::Bind {
            addr: "127.0.0.1:26658".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(channel_error("listen failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn node_failures_map_to_node_code() {
        let err = NodeError::ExitedEarly { code: Some(1) };
        let cli = connection_error("serve failed", ConnectionError::Node(err));
        assert_eq!(cli.code, NODE_ERROR);
        assert!(cli.message.starts_with("serve failed: "));
    }

    #[test]
    fn oversize_frames_are_data_invalid() {
        let err = FrameError::MessageTooLarge { size: 10, max: 1 };
        assert_eq!(frame_error("receive failed", err).code, DATA_INVALID);
    }
}
