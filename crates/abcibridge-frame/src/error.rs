/// Errors that can occur during message encoding/decoding.
///
/// An incomplete frame is not an error: decoders return `Ok(None)` and the
/// caller retries once more bytes arrive.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A length prefix ran past 10 bytes or 64 bits.
    #[error("malformed varint length prefix (overflows 64 bits)")]
    VarintOverflow,

    /// The announced message length exceeds the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: u64, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors that mean the byte stream itself can no longer be trusted.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FrameError::VarintOverflow | FrameError::MessageTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
