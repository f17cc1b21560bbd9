use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::varint::{decode_varint, encode_varint, encoded_len};

/// Default maximum message size: 100 MiB, the cap Tendermint's socket client applies.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Encode a message body into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────────┐
/// │ Length (varint)  │ Body                 │
/// │ 1..=10 bytes     │ (Length bytes)       │
/// └──────────────────┴──────────────────────┘
/// ```
pub fn encode_message(body: &[u8], dst: &mut BytesMut) {
    let len = body.len() as u64;
    dst.reserve(encoded_len(len) + body.len());
    encode_varint(len, dst);
    dst.put_slice(body);
}

/// Frame a single body into its own buffer.
pub fn frame_message(body: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    encode_message(body, &mut dst);
    dst.freeze()
}

/// Decode one message body from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet;
/// nothing is consumed in that case. On success, consumes the prefix and body.
pub fn decode_message(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Bytes>> {
    let Some((len, prefix_len)) = decode_varint(src)? else {
        return Ok(None); // Need more data
    };

    if len > max_message_size as u64 {
        return Err(FrameError::MessageTooLarge {
            size: len,
            max: max_message_size,
        });
    }

    let len = len as usize;
    if src.len() < prefix_len + len {
        return Ok(None); // Need more data
    }

    src.advance(prefix_len);
    Ok(Some(src.split_to(len).freeze()))
}

/// Drain every complete message currently held in `buf`.
///
/// The returned iterator is lazy and stops at the first incomplete message,
/// leaving the partial bytes in `buf` for the next call. After a decode error
/// it yields that error once and then ends.
pub fn read_all(buf: &mut BytesMut, max_message_size: usize) -> ReadAll<'_> {
    ReadAll {
        buf,
        max_message_size,
        failed: false,
    }
}

/// Iterator returned by [`read_all`].
#[derive(Debug)]
pub struct ReadAll<'a> {
    buf: &'a mut BytesMut,
    max_message_size: usize,
    failed: bool,
}

impl ReadAll<'_> {
    /// Bytes left in the accumulator (an incomplete trailing message, if any).
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

impl Iterator for ReadAll<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match decode_message(self.buf, self.max_message_size) {
            Ok(Some(body)) => Some(Ok(body)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message body size in bytes. Default: 100 MiB.
    pub max_message_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
