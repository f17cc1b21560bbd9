//! TCP server channel for the ABCI socket protocol.
//!
//! A [`TcpServerChannel`] listens where the node's `proxy_app` points,
//! accepts one peer at a time and turns its byte stream into [`Envelope`]s:
//! - Requests are delivered through `get_message` in wire order
//! - Responses passed to `send` are written in call order
//!
//! Framing lives in `abcibridge-frame`; this crate owns sockets, tasks and
//! the request queue.

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
mod queue;

pub use channel::TcpServerChannel;
pub use config::{ChannelConfig, PeerPolicy, DEFAULT_LISTEN_ADDR, DEFAULT_TARGET};
pub use envelope::Envelope;
pub use error::{ChannelError, Result};
