use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Where the node dials the application.
pub const DEFAULT_PROXY_APP: &str = "tcp://127.0.0.1:26658";
/// Tendermint RPC listen address.
pub const DEFAULT_RPC_LADDR: &str = "tcp://0.0.0.0:26657";
/// Tendermint P2P listen address.
pub const DEFAULT_P2P_LADDR: &str = "tcp://0.0.0.0:26656";
/// Node executable looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "tendermint";
/// Log file name inside the node home when none is configured.
pub const DEFAULT_LOG_FILE_NAME: &str = "node.log";

pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(500);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Arguments the node is launched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeParams {
    /// Address the node dials to reach the application (`--proxy_app`).
    pub proxy_app: String,
    /// RPC listen address (`--rpc.laddr`).
    pub rpc_laddr: String,
    /// P2P listen address (`--p2p.laddr`).
    pub p2p_laddr: String,
    /// Persistent seed peers (`--p2p.seeds`, comma separated).
    pub p2p_seeds: Vec<String>,
    /// Whether the node produces blocks without transactions.
    pub consensus_create_empty_blocks: bool,
    /// Node home directory (`--home`).
    pub home: PathBuf,
    /// Speak gRPC instead of the socket protocol to the application.
    pub use_grpc: bool,
}

impl NodeParams {
    /// Parameters for a node rooted at `home`, with default addresses.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            proxy_app: DEFAULT_PROXY_APP.to_string(),
            rpc_laddr: DEFAULT_RPC_LADDR.to_string(),
            p2p_laddr: DEFAULT_P2P_LADDR.to_string(),
            p2p_seeds: Vec::new(),
            consensus_create_empty_blocks: true,
            home: home.into(),
            use_grpc: false,
        }
    }

    pub fn with_proxy_app(mut self, addr: impl Into<String>) -> Self {
        self.proxy_app = addr.into();
        self
    }

    pub fn with_rpc_laddr(mut self, addr: impl Into<String>) -> Self {
        self.rpc_laddr = addr.into();
        self
    }

    pub fn with_p2p_laddr(mut self, addr: impl Into<String>) -> Self {
        self.p2p_laddr = addr.into();
        self
    }

    pub fn with_p2p_seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.p2p_seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_create_empty_blocks(mut self, create: bool) -> Self {
        self.consensus_create_empty_blocks = create;
        self
    }

    pub fn with_grpc(mut self, use_grpc: bool) -> Self {
        self.use_grpc = use_grpc;
        self
    }

    /// Arguments for `<binary> node ...`.
    pub fn node_args(&self, debug: bool) -> Vec<OsString> {
        let abci = if self.use_grpc { "grpc" } else { "socket" };
        let mut args: Vec<OsString> = vec![
            "node".into(),
            format!("--proxy_app={}", self.proxy_app).into(),
            format!("--rpc.laddr={}", self.rpc_laddr).into(),
            format!("--p2p.laddr={}", self.p2p_laddr).into(),
            format!("--p2p.seeds={}", self.p2p_seeds.join(",")).into(),
            format!(
                "--consensus.create_empty_blocks={}",
                self.consensus_create_empty_blocks
            )
            .into(),
            format!("--abci={abci}").into(),
        ];
        if debug {
            args.push("--log_level=debug".into());
        }
        args.extend(self.home_args());
        args
    }

    /// Arguments for `<binary> init ...`.
    pub fn init_args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("init")];
        args.extend(self.home_args());
        args
    }

    /// Arguments for `<binary> unsafe-reset-all ...`.
    pub fn reset_args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("unsafe-reset-all")];
        args.extend(self.home_args());
        args
    }

    fn home_args(&self) -> [OsString; 2] {
        ["--home".into(), self.home.clone().into_os_string()]
    }
}

/// How the supervisor runs the node process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Executable name or path.
    pub binary: PathBuf,
    /// Launch with `--log_level=debug`.
    pub debug: bool,
    /// A process that exits within this window failed to start.
    pub startup_grace: Duration,
    /// How long `stop` waits after SIGTERM before killing.
    pub stop_timeout: Duration,
    /// Output log. `None` means `<home>/node.log`.
    pub log_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            debug: false,
            startup_grace: DEFAULT_STARTUP_GRACE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            log_file: None,
        }
    }
}

impl NodeConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Resolve the log file for a node rooted at `home`.
    pub fn log_file_for(&self, home: &Path) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| home.join(DEFAULT_LOG_FILE_NAME))
    }

    pub(crate) fn binary_name(&self) -> String {
        self.binary.display().to_string()
    }
}
