use std::path::PathBuf;
use std::time::Duration;

use abcibridge_frame::{MessageKind, DEFAULT_MAX_MESSAGE_SIZE};
use abcibridge_node::{
    NodeConfig, NodeParams, DEFAULT_BINARY, DEFAULT_P2P_LADDR, DEFAULT_RPC_LADDR,
};
use abcibridge_transport::{ChannelConfig, PeerPolicy, DEFAULT_LISTEN_ADDR, DEFAULT_TARGET};
use clap::{ArgAction, Args, Subcommand, ValueEnum};

use crate::exit::{io_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod frame;
pub mod listen;
pub mod node;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for a node and print decoded requests.
    Listen(ListenArgs),
    /// Run a node with its ABCI channel, answering echo and flush.
    Serve(ServeArgs),
    /// Send a single framed message to an ABCI server.
    Send(SendArgs),
    /// Print the framed encoding of a payload or a varint.
    Frame(FrameArgs),
    /// Manage the node process and its home directory.
    Node(NodeCommandArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => runtime()?.block_on(listen::run(args, format)),
        Command::Serve(args) => runtime()?.block_on(serve::run(args, format)),
        Command::Send(args) => send::run(args, format),
        Command::Frame(args) => frame::run(args, format),
        Command::Node(args) => runtime()?.block_on(node::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PeerPolicyArg {
    Replace,
    Reject,
}

impl From<PeerPolicyArg> for PeerPolicy {
    fn from(arg: PeerPolicyArg) -> Self {
        match arg {
            PeerPolicyArg::Replace => PeerPolicy::Replace,
            PeerPolicyArg::Reject => PeerPolicy::Reject,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Address to listen on (host:port).
    #[arg(long, env = "ABCI_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,
    /// Application identity attached to decoded requests.
    #[arg(long, default_value = DEFAULT_TARGET)]
    pub target: String,
    /// Largest accepted message in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Bound the request queue; reads pause while it is full.
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// What to do with a second peer while one is connected.
    #[arg(long, value_enum, default_value = "replace")]
    pub peer_policy: PeerPolicyArg,
}

impl ChannelArgs {
    pub fn config(&self) -> ChannelConfig {
        let config = ChannelConfig::default()
            .with_listen_addr(&self.addr)
            .with_target(&self.target)
            .with_max_message_size(self.max_message_size)
            .with_peer_policy(self.peer_policy.into());
        match self.queue_capacity {
            Some(capacity) => config.with_queue_capacity(capacity),
            None => config,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Node home directory.
    #[arg(long, env = "TMHOME")]
    pub home: PathBuf,
    /// Node executable.
    #[arg(long, env = "TENDERMINT_BINARY", default_value = DEFAULT_BINARY)]
    pub binary: PathBuf,
    /// Address the node dials to reach the application.
    #[arg(long)]
    pub proxy_app: Option<String>,
    /// RPC listen address.
    #[arg(long, default_value = DEFAULT_RPC_LADDR)]
    pub rpc_laddr: String,
    /// P2P listen address.
    #[arg(long, default_value = DEFAULT_P2P_LADDR)]
    pub p2p_laddr: String,
    /// Seed peers (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub p2p_seeds: Vec<String>,
    /// Produce blocks without transactions.
    #[arg(
        long,
        env = "CREATE_EMPTY_BLOCKS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub create_empty_blocks: bool,
    /// Talk gRPC to the application instead of the socket protocol.
    #[arg(long)]
    pub grpc: bool,
    /// Run the node with debug logging.
    #[arg(long)]
    pub debug: bool,
    /// Node output log file. Default: <home>/node.log.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
    /// Time allowed for a graceful stop before killing (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub stop_timeout: String,
    /// A node exiting within this window failed to start.
    #[arg(long, default_value = "500ms")]
    pub startup_grace: String,
}

impl NodeArgs {
    pub fn params(&self, default_proxy_app: &str) -> NodeParams {
        let proxy_app = self
            .proxy_app
            .clone()
            .unwrap_or_else(|| default_proxy_app.to_string());
        NodeParams::new(&self.home)
            .with_proxy_app(proxy_app)
            .with_rpc_laddr(&self.rpc_laddr)
            .with_p2p_laddr(&self.p2p_laddr)
            .with_p2p_seeds(self.p2p_seeds.iter().filter(|s| !s.is_empty()).cloned())
            .with_create_empty_blocks(self.create_empty_blocks)
            .with_grpc(self.grpc)
    }

    pub fn config(&self) -> CliResult<NodeConfig> {
        let config = NodeConfig::default()
            .with_binary(&self.binary)
            .with_debug(self.debug)
            .with_stop_timeout(parse_duration(&self.stop_timeout)?)
            .with_startup_grace(parse_duration(&self.startup_grace)?);
        Ok(match &self.log_file {
            Some(path) => config.with_log_file(path),
            None => config,
        })
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// UTF-8 payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(encoded) = &self.hex {
            return hex::decode(encoded.trim())
                .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
        }
        if let Some(path) = &self.file {
            return std::fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Exit after receiving N requests.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    #[command(flatten)]
    pub node: NodeArgs,
    /// Exit after N requests that were not answered automatically.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address (host:port).
    #[arg(env = "ABCI_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Treat the payload as the inner message of this request kind.
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<MessageKind>,
    /// Wait for one response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Largest accepted response in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Treat the payload as the inner message of this request kind.
    #[arg(long, value_parser = parse_kind, conflicts_with = "varint")]
    pub kind: Option<MessageKind>,
    /// Encode a bare varint instead of a message.
    #[arg(long, conflicts_with_all = ["data", "hex", "file"])]
    pub varint: Option<u64>,
}

#[derive(Args, Debug)]
pub struct NodeCommandArgs {
    #[command(subcommand)]
    pub action: NodeAction,
}

#[derive(Subcommand, Debug)]
pub enum NodeAction {
    /// Initialize the node home directory.
    Init(NodeInitArgs),
    /// Run the node in the foreground until interrupted.
    Start(NodeStartArgs),
    /// Reset genesis and optionally prune chain data.
    Reset(NodeResetArgs),
    /// Print the validator's public parameters.
    Params(NodeParamsArgs),
    /// Replace genesis.json with a new chain config and validator set.
    Genesis(NodeGenesisArgs),
}

#[derive(Args, Debug)]
pub struct NodeInitArgs {
    #[command(flatten)]
    pub node: NodeArgs,
    /// Wipe existing config and data first.
    #[arg(long)]
    pub force: bool,
    /// Skip the local-node config.toml overrides.
    #[arg(long)]
    pub keep_config: bool,
}

#[derive(Args, Debug)]
pub struct NodeStartArgs {
    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Args, Debug)]
pub struct NodeResetArgs {
    #[command(flatten)]
    pub node: NodeArgs,
    /// Genesis time to write. Default: the current genesis value.
    #[arg(long)]
    pub genesis_time: Option<String>,
    /// App hash to write. Default: the current genesis value.
    #[arg(long)]
    pub app_hash: Option<String>,
    /// Also discard chain data (`unsafe-reset-all`).
    #[arg(long)]
    pub prune: bool,
}

#[derive(Args, Debug)]
pub struct NodeParamsArgs {
    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Args, Debug)]
pub struct NodeGenesisArgs {
    #[command(flatten)]
    pub node: NodeArgs,
    /// JSON document with `genesis_config` and `validators`.
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_kind(name: &str) -> Result<MessageKind, String> {
    MessageKind::from_name(name)
        .filter(|kind| kind.request_field().is_some())
        .ok_or_else(|| {
            let names: Vec<&str> = MessageKind::requests().map(MessageKind::name).collect();
            format!("unknown request kind {name:?} (expected one of: {})", names.join(", "))
        })
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Resolves when the process receives Ctrl-C.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
