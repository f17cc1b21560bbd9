//! `tokio_util::codec` adapter for ABCI framing.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, encode_message, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::FrameError;

/// Length-delimited ABCI codec for `FramedRead`/`FramedWrite`.
#[derive(Debug, Clone)]
pub struct AbciCodec {
    max_message_size: usize,
}

impl AbciCodec {
    /// Codec with the default size cap.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Codec with an explicit size cap, applied in both directions.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for AbciCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AbciCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, self.max_message_size)
    }
}

impl<B: AsRef<[u8]>> Encoder<B> for AbciCodec {
    type Error = FrameError;

    fn encode(&mut self, item: B, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.as_ref();
        if body.len() > self.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: body.len() as u64,
                max: self.max_message_size,
            });
        }
        encode_message(body, dst);
        Ok(())
    }
}
