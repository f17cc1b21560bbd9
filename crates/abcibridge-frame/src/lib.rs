//! Varint length-prefixed message framing for the ABCI socket protocol.
//!
//! Every message on an ABCI connection is framed as:
//! - An unsigned LEB128 varint holding the body length
//! - The body itself (a protobuf `Request` or `Response`)
//!
//! Decoders never consume a partial message; they report "need more bytes"
//! as `Ok(None)` and resume once the caller has buffered more data.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod varint;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::AbciCodec;
pub use codec::{
    decode_message, encode_message, frame_message, read_all, FrameConfig, ReadAll,
    DEFAULT_MAX_MESSAGE_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::{inner_message, MessageKind};
pub use reader::MessageReader;
pub use varint::{decode_varint, encode_varint, encoded_len, varint_to_vec, MAX_VARINT_LEN};
pub use writer::MessageWriter;
