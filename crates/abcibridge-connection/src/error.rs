use abcibridge_node::NodeError;
use abcibridge_transport::ChannelError;

/// Errors that can occur while bringing a server connection up or down.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Node process error.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// Server channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
