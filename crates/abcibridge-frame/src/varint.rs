//! Unsigned LEB128 varints, as used by the ABCI length prefix.

use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Longest possible encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

const PAYLOAD_MASK: u8 = 0x7f;
const CONTINUATION: u8 = 0x80;

/// Append the minimal varint encoding of `value` to `dst`.
pub fn encode_varint(mut value: u64, dst: &mut impl BufMut) {
    loop {
        let byte = (value & u64::from(PAYLOAD_MASK)) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            return;
        }
        dst.put_u8(byte | CONTINUATION);
    }
}

/// Encode `value` into a freshly allocated buffer.
pub fn varint_to_vec(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode_varint(value, &mut out);
    out
}

/// Number of bytes `encode_varint` writes for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint from the front of `src`.
///
/// Returns `Ok(Some((value, consumed)))` on success and `Ok(None)` when `src`
/// ends before a terminating byte (MSB clear) is seen.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (index, &byte) in src.iter().enumerate() {
        // The tenth byte may only contribute the single remaining bit.
        if index == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(FrameError::VarintOverflow);
        }
        value |= u64::from(byte & PAYLOAD_MASK) << (7 * index);
        if byte & CONTINUATION == 0 {
            return Ok(Some((value, index + 1)));
        }
    }
    Ok(None)
}
