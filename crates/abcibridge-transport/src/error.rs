use abcibridge_frame::FrameError;

/// Errors that can occur in the ABCI server channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the listener or peer stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message framing failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// `send` was called with no connected peer.
    #[error("no peer connected")]
    NotConnected,

    /// The envelope answers a request from a connection that is no longer active.
    #[error("connection {requested} is gone (active connection is {active})")]
    StaleConnection { requested: u64, active: u64 },

    /// `connect` was called while already listening.
    #[error("channel is already listening")]
    AlreadyListening,

    /// `connect` was called after `disconnect`.
    #[error("channel has been disconnected and cannot be restarted")]
    Terminated,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
