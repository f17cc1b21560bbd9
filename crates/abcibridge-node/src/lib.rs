//! Supervision of a local Tendermint node process.
//!
//! [`NodeSupervisor`] runs the node binary with arguments built from
//! [`NodeParams`], forwards its output to `tracing` and a log file, and stops
//! it with SIGTERM followed by a kill once [`NodeConfig::stop_timeout`]
//! elapses. The [`home`] module edits the node's home directory
//! (`genesis.json`, `config.toml`).

pub mod error;
pub mod home;
pub mod params;
pub mod supervisor;

pub use error::{NodeError, Result};
pub use home::{
    override_config, read_genesis_defaults, read_validator_params, reset_genesis, write_genesis,
    GenesisConfig, GenesisDefaults, GenesisUpdate, GenesisValidator, DEFAULT_CONFIG_OVERRIDES,
};
pub use params::{
    NodeConfig, NodeParams, DEFAULT_BINARY, DEFAULT_P2P_LADDR, DEFAULT_PROXY_APP,
    DEFAULT_RPC_LADDR,
};
pub use supervisor::{NodeStatus, NodeSupervisor};
