use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Target of the forwarded node stdout/stderr lines.
pub const NODE_OUTPUT_TARGET: &str = "abcibridge_node::output";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Per-target filter: bridge events at `level`, node output at
/// `node_output` (defaults to `level`).
pub fn log_filter(level: LogLevel, node_output: Option<LogLevel>) -> Targets {
    Targets::new()
        .with_default(level.as_filter())
        .with_target(
            NODE_OUTPUT_TARGET,
            node_output.unwrap_or(level).as_filter(),
        )
}

/// Install the stderr subscriber.
///
/// Targets are shown so forwarded node output stays distinguishable from the
/// bridge's own events.
pub fn init_logging(format: LogFormat, level: LogLevel, node_output: Option<LogLevel>) {
    let filter = log_filter(level, node_output);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .try_init(),
    };
}
