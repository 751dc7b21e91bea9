//! File system paths for telemetry delivery.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory for all runtime files.
const BASE_DIR_NAME: &str = ".telemetry-delivery";
/// Queue database filename.
const QUEUE_DATABASE_NAME: &str = "queue.sqlite";
/// Log filename under the logs directory.
const LOG_FILE_NAME: &str = "telemetry.jsonl";

/// Manages file system paths for the delivery subsystem.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.telemetry-delivery)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.telemetry-delivery`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted retry queue path (<base>/queue.sqlite).
    pub fn queue_database_file(&self) -> PathBuf {
        self.base_dir.join(QUEUE_DATABASE_NAME)
    }

    /// Get the logs directory (<base>/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the structured log file (<base>/logs/telemetry.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
