use std::path::PathBuf;

/// Errors that can occur while managing the node process or its home directory.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// `init` found existing node state and `force` was not requested.
    #[error("node home {} is already initialized", home.display())]
    AlreadyInitialized { home: PathBuf },

    /// The node's `init` command exited unsuccessfully.
    #[error("node initialization failed (exit code {code:?}): {stderr}")]
    Initialization { code: Option<i32>, stderr: String },

    /// The node binary does not exist or is not on `PATH`.
    #[error("node binary not found: {binary}")]
    BinaryNotFound { binary: String },

    /// Spawning the node binary failed for another reason.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    /// The node process exited inside the startup grace window.
    #[error("node process exited during startup (exit code {code:?})")]
    ExitedEarly { code: Option<i32> },

    /// A maintenance command exited unsuccessfully.
    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The operation is not allowed while the node is running.
    #[error("node process is running")]
    Running,

    /// A home directory JSON file (`genesis.json`, validator key) is not
    /// a JSON object.
    #[error("invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Filesystem or process I/O failed.
    #[error("node I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Whether this error was raised by `start`.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound { .. } | Self::Spawn { .. } | Self::ExitedEarly { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
