//! One ABCI application endpoint: a supervised node plus the TCP channel it
//! dials.
//!
//! [`ServerConnection`] is the boundary an application drives: `connect`,
//! `receive` requests, `send` responses, `disconnect`.

pub mod connection;
pub mod error;

pub use abcibridge_frame::MessageKind;
pub use abcibridge_node::{GenesisDefaults, NodeConfig, NodeParams, NodeStatus, NodeSupervisor};
pub use abcibridge_transport::{ChannelConfig, Envelope, TcpServerChannel};
pub use connection::ServerConnection;
pub use error::{ConnectionError, Result};
