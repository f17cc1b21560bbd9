//! ABCI socket server plumbing for local Tendermint nodes.
//!
//! # Crate Structure
//!
//! - [`frame`]: Varint length-prefixed framing and message kinds
//! - [`transport`]: TCP server channel delivering ordered requests
//! - [`node`]: Node process supervision and home directory maintenance
//! - [`connection`]: Node plus channel behind one boundary (behind `connection` feature)

/// Re-export frame types.
pub mod frame {
    pub use abcibridge_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use abcibridge_transport::*;
}

/// Re-export node types.
pub mod node {
    pub use abcibridge_node::*;
}

/// Re-export connection types (requires `connection` feature).
#[cfg(feature = "connection")]
pub mod connection {
    pub use abcibridge_connection::*;
}
