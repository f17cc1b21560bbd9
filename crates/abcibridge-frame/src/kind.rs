//! ABCI message kinds.
//!
//! Every ABCI body is a protobuf `Request` or `Response` whose single populated
//! `oneof` field identifies the method. The field number is read from the
//! body's leading key, so a kind can be resolved without decoding the schema.
//!
//! Response field numbers are shifted by one relative to requests because
//! `Response` reserves field 1 for `exception`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};

use crate::varint::{decode_varint, encode_varint, encoded_len};

/// Protobuf wire type for length-delimited fields.
const WIRE_TYPE_LEN: u64 = 2;

/// The ABCI method a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Echo,
    Flush,
    Info,
    SetOption,
    InitChain,
    Query,
    BeginBlock,
    CheckTx,
    DeliverTx,
    EndBlock,
    Commit,
    ListSnapshots,
    OfferSnapshot,
    LoadSnapshotChunk,
    ApplySnapshotChunk,
    /// Response-only: the application failed to handle the request.
    Exception,
    /// A field number outside the known set, or a body without a oneof key.
    Unknown(u32),
}

const REQUEST_KINDS: [MessageKind; 15] = [
    MessageKind::Echo,
    MessageKind::Flush,
    MessageKind::Info,
    MessageKind::SetOption,
    MessageKind::InitChain,
    MessageKind::Query,
    MessageKind::BeginBlock,
    MessageKind::CheckTx,
    MessageKind::DeliverTx,
    MessageKind::EndBlock,
    MessageKind::Commit,
    MessageKind::ListSnapshots,
    MessageKind::OfferSnapshot,
    MessageKind::LoadSnapshotChunk,
    MessageKind::ApplySnapshotChunk,
];

impl MessageKind {
    /// Resolve a `Request.value` oneof field number.
    pub fn from_request_field(field: u32) -> Self {
        match field {
            1..=15 => REQUEST_KINDS[(field - 1) as usize],
            other => MessageKind::Unknown(other),
        }
    }

    /// Resolve a `Response.value` oneof field number.
    pub fn from_response_field(field: u32) -> Self {
        match field {
            1 => MessageKind::Exception,
            2..=16 => REQUEST_KINDS[(field - 2) as usize],
            other => MessageKind::Unknown(other),
        }
    }

    /// Field number of this kind inside `Request`, if requests carry it.
    pub fn request_field(self) -> Option<u32> {
        REQUEST_KINDS
            .iter()
            .position(|kind| *kind == self)
            .map(|index| index as u32 + 1)
    }

    /// Field number of this kind inside `Response`.
    pub fn response_field(self) -> Option<u32> {
        match self {
            MessageKind::Exception => Some(1),
            MessageKind::Unknown(_) => None,
            other => other.request_field().map(|field| field + 1),
        }
    }

    /// Classify a serialized `Request` body.
    pub fn of_request(body: &[u8]) -> Self {
        match leading_field(body) {
            Some(field) => Self::from_request_field(field),
            None => MessageKind::Unknown(0),
        }
    }

    /// Classify a serialized `Response` body.
    pub fn of_response(body: &[u8]) -> Self {
        match leading_field(body) {
            Some(field) => Self::from_response_field(field),
            None => MessageKind::Unknown(0),
        }
    }

    /// Snake-case method name, matching the protobuf field names.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Echo => "echo",
            MessageKind::Flush => "flush",
            MessageKind::Info => "info",
            MessageKind::SetOption => "set_option",
            MessageKind::InitChain => "init_chain",
            MessageKind::Query => "query",
            MessageKind::BeginBlock => "begin_block",
            MessageKind::CheckTx => "check_tx",
            MessageKind::DeliverTx => "deliver_tx",
            MessageKind::EndBlock => "end_block",
            MessageKind::Commit => "commit",
            MessageKind::ListSnapshots => "list_snapshots",
            MessageKind::OfferSnapshot => "offer_snapshot",
            MessageKind::LoadSnapshotChunk => "load_snapshot_chunk",
            MessageKind::ApplySnapshotChunk => "apply_snapshot_chunk",
            MessageKind::Exception => "exception",
            MessageKind::Unknown(_) => "unknown",
        }
    }

    /// Resolve a method name as printed by [`MessageKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        REQUEST_KINDS
            .iter()
            .chain(std::iter::once(&MessageKind::Exception))
            .copied()
            .find(|kind| kind.name() == name)
    }

    /// Every kind a `Request` can carry, in field-number order.
    pub fn requests() -> impl Iterator<Item = MessageKind> {
        REQUEST_KINDS.into_iter()
    }

    /// Wrap an already encoded inner message as a `Request` body.
    pub fn wrap_request(self, inner: &[u8]) -> Option<Bytes> {
        self.request_field().map(|field| wrap_field(field, inner))
    }

    /// Wrap an already encoded inner message as a `Response` body.
    pub fn wrap_response(self, inner: &[u8]) -> Option<Bytes> {
        self.response_field().map(|field| wrap_field(field, inner))
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Unknown(field) => write!(f, "unknown({field})"),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The inner message bytes of a `Request`/`Response` body.
///
/// Returns `None` when the body does not start with a complete
/// length-delimited field.
pub fn inner_message(body: &[u8]) -> Option<&[u8]> {
    let (key, key_len) = decode_varint(body).ok().flatten()?;
    if key & 0x07 != WIRE_TYPE_LEN {
        return None;
    }
    let rest = &body[key_len..];
    let (len, len_len) = decode_varint(rest).ok().flatten()?;
    let len = usize::try_from(len).ok()?;
    rest.get(len_len..len_len.checked_add(len)?)
}

fn leading_field(body: &[u8]) -> Option<u32> {
    let (key, _) = decode_varint(body).ok().flatten()?;
    if key & 0x07 != WIRE_TYPE_LEN {
        return None;
    }
    u32::try_from(key >> 3).ok()
}

fn wrap_field(field: u32, inner: &[u8]) -> Bytes {
    let key = (u64::from(field) << 3) | WIRE_TYPE_LEN;
    let len = inner.len() as u64;
    let mut dst = BytesMut::with_capacity(encoded_len(key) + encoded_len(len) + inner.len());
    encode_varint(key, &mut dst);
    encode_varint(len, &mut dst);
    dst.put_slice(inner);
    dst.freeze()
}
