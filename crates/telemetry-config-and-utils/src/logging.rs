//! Logging initialization for telemetry delivery.
//!
//! Hosts call [`init_logging`] once at startup and use `tracing` macros
//! everywhere else. Structured JSONL goes to `<base>/logs/telemetry.jsonl`,
//! optionally mirrored to stderr.

use crate::{CoreError, CoreResult, Paths};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, logged once at startup.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to [`Paths::log_file`].
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "telemetry-delivery".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with the default file location and stderr output.
///
/// ```ignore
/// init_logging("info")?;
/// tracing::info!("Telemetry delivery started");
/// ```
pub fn init_logging(level: &str) -> CoreResult<()> {
    init_logging_with_config(LogConfig {
        default_level: level.into(),
        also_stderr: true,
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns an error instead of panicking if a global subscriber is
/// already installed.
pub fn init_logging_with_config(config: LogConfig) -> CoreResult<()> {
    let log_path = match config.log_path.clone() {
        Some(path) => path,
        None => Paths::new()?.log_file(),
    };
    let file = open_log_file(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_writer(Mutex::new(file));

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(build_filter(&config.default_level))
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    info!(
        service = %config.service_name,
        path = %log_path.display(),
        "Logging initialized"
    );
    Ok(())
}

/// `RUST_LOG` wins over the configured default level.
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(default_level))
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(parse_level(level)).into())
}

/// Open the log file in append mode, creating parent directories.
fn open_log_file(path: &Path) -> CoreResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
