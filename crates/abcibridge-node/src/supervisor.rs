use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NodeError, Result};
use crate::home::{self, GenesisDefaults};
use crate::params::{NodeConfig, NodeParams};

const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable lifecycle of the node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    Running { pid: u32 },
    /// Stopped by `stop`.
    Stopped,
    /// Exited on its own. The supervisor does not restart it.
    Exited { code: Option<i32> },
}

struct NodeHandle {
    pid: u32,
    shutdown: CancellationToken,
    supervise: JoinHandle<()>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Starts, watches and stops a single node process.
///
/// `start` and `stop` take `&mut self`; at most one process is live per
/// supervisor.
pub struct NodeSupervisor {
    params: NodeParams,
    config: NodeConfig,
    handle: Option<NodeHandle>,
    status: watch::Sender<NodeStatus>,
}

impl NodeSupervisor {
    pub fn new(params: NodeParams, config: NodeConfig) -> Self {
        let (status, _) = watch::channel(NodeStatus::NotStarted);
        Self {
            params,
            config,
            handle: None,
            status,
        }
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Resolved node log file.
    pub fn log_file(&self) -> PathBuf {
        self.config.log_file_for(&self.params.home)
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle transitions, including unexpected exits.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && matches!(self.status(), NodeStatus::Running { .. })
    }

    /// PID of the live process.
    pub fn pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .filter(|_| self.is_running())
            .map(|handle| handle.pid)
    }

    /// Run `<binary> init` against the home directory.
    ///
    /// Existing node state is an error unless `force` is set, in which case
    /// the `config` and `data` directories are wiped first.
    pub async fn init(&self, force: bool) -> Result<()> {
        if self.is_running() {
            return Err(NodeError::Running);
        }
        let home = &self.params.home;
        if home::has_node_state(home) {
            if !force {
                return Err(NodeError::AlreadyInitialized { home: home.clone() });
            }
            info!(home = %home.display(), "clearing existing node state");
            home::clear_node_state(home).await?;
        }
        tokio::fs::create_dir_all(home).await?;

        let output = self.command().args(self.params.init_args()).output().await;
        let output = output.map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(NodeError::Initialization {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(home = %home.display(), "node home initialized");
        Ok(())
    }

    /// Launch the node. A no-op while the node is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!(pid = ?self.pid(), "node already running");
            return Ok(());
        }
        self.stop().await?;

        let log = NodeLog::open(&self.log_file()).await;
        let mut child = self
            .command()
            .args(self.params.node_args(self.config.debug))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, "stdout", log.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, "stderr", log.clone())));
        }

        match tokio::time::timeout(self.config.startup_grace, child.wait()).await {
            Ok(Ok(status)) => {
                drain(forwarders).await;
                return Err(self.startup_failed(&log, status.code()).await);
            }
            Ok(Err(err)) => {
                if let Err(kill_err) = child.start_kill() {
                    debug!(err = %kill_err, "failed to kill node after wait error");
                }
                drain(forwarders).await;
                self.startup_failed(&log, None).await;
                return Err(err.into());
            }
            Err(_) => {}
        }

        let Some(pid) = child.id() else {
            drain(forwarders).await;
            return Err(self.startup_failed(&log, None).await);
        };

        log.append("node process started").await;
        info!(
            pid,
            binary = %self.config.binary_name(),
            home = %self.params.home.display(),
            "node process started"
        );
        self.status.send_replace(NodeStatus::Running { pid });

        let shutdown = CancellationToken::new();
        let supervise = tokio::spawn(supervise(
            child,
            pid,
            shutdown.clone(),
            self.config.stop_timeout,
            self.status.clone(),
            log,
        ));
        self.handle = Some(NodeHandle {
            pid,
            shutdown,
            supervise,
            forwarders,
        });
        Ok(())
    }

    /// Terminate the node: SIGTERM, wait up to `stop_timeout`, then kill.
    ///
    /// A no-op when nothing was started. The handle is always cleared.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.shutdown.cancel();
        if let Err(err) = handle.supervise.await {
            warn!(pid = handle.pid, %err, "node supervision task failed");
        }
        drain(handle.forwarders).await;
        Ok(())
    }

    /// Stop the node if running, then start it again.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Stop the node, prune its blocks, reset `genesis.json` and start again.
    ///
    /// Missing genesis values fall back to those already in the file.
    /// Returns the values written.
    pub async fn hard_reset(
        &mut self,
        genesis_time: Option<String>,
        app_hash: Option<String>,
    ) -> Result<GenesisDefaults> {
        self.stop().await?;
        self.prune_blocks().await?;

        let home = self.params.home.clone();
        let defaults = home::read_genesis_defaults(&home).await?;
        let genesis_time = genesis_time.or(defaults.genesis_time).unwrap_or_default();
        let app_hash = app_hash.or(defaults.app_hash).unwrap_or_default();
        home::reset_genesis(&home, &genesis_time, &app_hash).await?;

        self.start().await?;
        info!(home = %home.display(), "node hard reset");
        Ok(GenesisDefaults {
            genesis_time: Some(genesis_time),
            app_hash: Some(app_hash),
        })
    }

    /// Run `<binary> unsafe-reset-all`, discarding chain data.
    pub async fn prune_blocks(&self) -> Result<()> {
        if self.is_running() {
            return Err(NodeError::Running);
        }

        let output = self.command().args(self.params.reset_args()).output().await;
        let output = output.map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(NodeError::CommandFailed {
                command: format!("{} unsafe-reset-all", self.config.binary_name()),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(home = %self.params.home.display(), "node blocks pruned");
        Ok(())
    }

    async fn startup_failed(&self, log: &NodeLog, code: Option<i32>) -> NodeError {
        warn!(?code, "node process exited during startup");
        log.append(&format!("node process exited during startup (code {code:?})"))
            .await;
        self.status.send_replace(NodeStatus::Exited { code });
        NodeError::ExitedEarly { code }
    }

    fn command(&self) -> Command {
        Command::new(&self.config.binary)
    }

    fn spawn_error(&self, source: std::io::Error) -> NodeError {
        let binary = self.config.binary_name();
        if source.kind() == std::io::ErrorKind::NotFound {
            NodeError::BinaryNotFound { binary }
        } else {
            NodeError::Spawn { binary, source }
        }
    }
}

impl Drop for NodeSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for NodeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSupervisor")
            .field("binary", &self.config.binary)
            .field("home", &self.params.home)
            .field("status", &self.status())
            .finish()
    }
}

async fn supervise(
    mut child: Child,
    pid: u32,
    shutdown: CancellationToken,
    stop_timeout: Duration,
    status: watch::Sender<NodeStatus>,
    log: NodeLog,
) {
    tokio::select! {
        exited = child.wait() => {
            let code = exited.ok().and_then(|status| status.code());
            warn!(pid, ?code, "node process exited unexpectedly");
            log.append(&format!("node process exited (code {code:?})")).await;
            status.send_replace(NodeStatus::Exited { code });
        }
        () = shutdown.cancelled() => {
            terminate(&mut child, pid, stop_timeout).await;
            log.append("node process stopped").await;
            info!(pid, "node process stopped");
            status.send_replace(NodeStatus::Stopped);
        }
    }
}

async fn terminate(child: &mut Child, pid: u32, stop_timeout: Duration) {
    if !send_sigterm(pid) {
        debug!(pid, "SIGTERM not delivered");
    }

    match tokio::time::timeout(stop_timeout, child.wait()).await {
        Ok(Ok(status)) => debug!(pid, code = ?status.code(), "node process exited"),
        Ok(Err(err)) => warn!(pid, %err, "failed to wait for node process"),
        Err(_) => {
            warn!(
                pid,
                timeout_ms = stop_timeout.as_millis() as u64,
                "node process ignored SIGTERM, killing"
            );
            if let Err(err) = child.kill().await {
                warn!(pid, %err, "failed to kill node process");
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: `kill` has no memory-safety preconditions.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}

async fn forward_lines<R>(reader: R, stream: &'static str, log: NodeLog)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(target: "abcibridge_node::output", stream, "{line}");
                log.append(&line).await;
            }
            Ok(None) => break,
            Err(err) => {
                debug!(stream, %err, "node output stream failed");
                break;
            }
        }
    }
}

async fn drain(forwarders: Vec<JoinHandle<()>>) {
    for mut forwarder in forwarders {
        if tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, &mut forwarder)
            .await
            .is_err()
        {
            forwarder.abort();
        }
    }
}

/// Append-only node output log shared by the forwarders.
#[derive(Clone)]
struct NodeLog {
    file: Option<Arc<Mutex<File>>>,
}

impl NodeLog {
    async fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %path.display(), %err, "cannot create node log directory");
                return Self { file: None };
            }
        }
        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(file) => Self {
                file: Some(Arc::new(Mutex::new(file))),
            },
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot open node log file");
                Self { file: None }
            }
        }
    }

    async fn append(&self, line: &str) {
        let Some(file) = &self.file else {
            return;
        };
        let mut file = file.lock().await;
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        }
        .await;
        if let Err(err) = written {
            debug!(%err, "failed to append to node log");
        }
    }
}
