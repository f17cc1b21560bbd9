use std::path::PathBuf;

use abcibridge_node::home::config_path;
use abcibridge_node::{
    override_config, read_genesis_defaults, read_validator_params, reset_genesis, write_genesis,
    GenesisUpdate, NodeStatus, NodeSupervisor, DEFAULT_CONFIG_OVERRIDES, DEFAULT_PROXY_APP,
};
use serde::Serialize;
use tracing::info;

use crate::cmd::{
    interrupted, NodeAction, NodeArgs, NodeCommandArgs, NodeGenesisArgs, NodeInitArgs,
    NodeParamsArgs, NodeResetArgs,
};
use crate::exit::{io_error, node_error, CliError, CliResult, DATA_INVALID, NODE_ERROR, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Debug, Serialize)]
struct InitOutput {
    home: PathBuf,
    config_overrides: usize,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    home: PathBuf,
    log_file: PathBuf,
    #[serde(flatten)]
    status: NodeStatus,
}

#[derive(Debug, Serialize)]
struct GenesisOutput {
    home: PathBuf,
    chain_id: String,
    validators: usize,
}

#[derive(Debug, Serialize)]
struct ResetOutput {
    home: PathBuf,
    genesis_time: String,
    app_hash: String,
    pruned: bool,
}

pub async fn run(args: NodeCommandArgs, format: OutputFormat) -> CliResult<i32> {
    match args.action {
        NodeAction::Init(args) => init(args, format).await,
        NodeAction::Start(args) => start(args.node, format).await,
        NodeAction::Reset(args) => reset(args, format).await,
        NodeAction::Params(args) => params(args, format).await,
        NodeAction::Genesis(args) => genesis(args, format).await,
    }
}

fn supervisor(args: &NodeArgs) -> CliResult<NodeSupervisor> {
    Ok(NodeSupervisor::new(
        args.params(DEFAULT_PROXY_APP),
        args.config()?,
    ))
}

async fn init(args: NodeInitArgs, format: OutputFormat) -> CliResult<i32> {
    let node = supervisor(&args.node)?;
    node.init(args.force)
        .await
        .map_err(|err| node_error("init failed", err))?;

    let home = args.node.home;
    let mut config_overrides = 0;
    if !args.keep_config && config_path(&home).exists() {
        config_overrides = override_config(&home, DEFAULT_CONFIG_OVERRIDES)
            .await
            .map_err(|err| node_error("config override failed", err))?;
    }

    print_record(
        &InitOutput {
            home,
            config_overrides,
        },
        format,
    );
    Ok(SUCCESS)
}

async fn start(args: NodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut node = supervisor(&args)?;
    let mut status = node.subscribe();
    node.start()
        .await
        .map_err(|err| node_error("start failed", err))?;

    print_record(
        &StatusOutput {
            home: args.home.clone(),
            log_file: node.log_file(),
            status: node.status(),
        },
        format,
    );

    let exited = tokio::select! {
        () = interrupted() => None,
        changed = status.wait_for(|s| matches!(s, NodeStatus::Exited { .. })) => {
            changed.ok().map(|s| *s)
        }
    };

    info!("stopping node");
    node.stop()
        .await
        .map_err(|err| node_error("stop failed", err))?;

    match exited {
        Some(NodeStatus::Exited { code }) => Err(CliError::new(
            NODE_ERROR,
            format!("node exited unexpectedly (exit code {code:?})"),
        )),
        _ => Ok(SUCCESS),
    }
}

async fn reset(args: NodeResetArgs, format: OutputFormat) -> CliResult<i32> {
    let home = args.node.home.clone();
    let defaults = read_genesis_defaults(&home)
        .await
        .map_err(|err| node_error("reading genesis failed", err))?;
    let genesis_time = args
        .genesis_time
        .or(defaults.genesis_time)
        .unwrap_or_default();
    let app_hash = args.app_hash.or(defaults.app_hash).unwrap_or_default();

    if args.prune {
        supervisor(&args.node)?
            .prune_blocks()
            .await
            .map_err(|err| node_error("prune failed", err))?;
    }
    reset_genesis(&home, &genesis_time, &app_hash)
        .await
        .map_err(|err| node_error("genesis reset failed", err))?;

    print_record(
        &ResetOutput {
            home,
            genesis_time,
            app_hash,
            pruned: args.prune,
        },
        format,
    );
    Ok(SUCCESS)
}

async fn params(args: NodeParamsArgs, format: OutputFormat) -> CliResult<i32> {
    let params = read_validator_params(&args.node.home)
        .await
        .map_err(|err| node_error("reading validator key failed", err))?;
    print_record(&params, format);
    Ok(SUCCESS)
}

async fn genesis(args: NodeGenesisArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|err| io_error("reading genesis update failed", err))?;
    let update: GenesisUpdate = serde_json::from_str(&raw).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid genesis update {}: {err}", args.file.display()),
        )
    })?;

    let home = args.node.home;
    write_genesis(&home, &update)
        .await
        .map_err(|err| node_error("genesis rewrite failed", err))?;

    print_record(
        &GenesisOutput {
            home,
            chain_id: update.genesis_config.chain_id,
            validators: update.validators.len(),
        },
        format,
    );
    Ok(SUCCESS)
}
