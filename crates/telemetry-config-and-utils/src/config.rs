//! Configuration management for telemetry delivery.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default interval between retry cycles.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 30_000;

/// Default number of concurrent sends per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of retry intervals between connection checks.
pub const DEFAULT_HEARTBEAT_MULTIPLIER: u32 = 2;

/// Retry queue retention and backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Failed attempts after which an event is pruned.
    pub max_retries: u32,
    /// Age in seconds after which an event is pruned.
    pub max_age_secs: u64,
    /// Queue size above which the backpressure flag is raised.
    pub warning_threshold: usize,
    /// Hard ceiling; oldest events beyond it are pruned.
    pub max_queue_size: usize,
    /// Backoff after the first failed attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for the exponential backoff.
    pub backoff_max_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            max_age_secs: 7 * 24 * 60 * 60,
            warning_threshold: 1_000,
            max_queue_size: 5_000,
            backoff_base_ms: 30_000,
            backoff_max_ms: 30 * 60 * 1_000,
        }
    }
}

/// Main telemetry delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Milliseconds between scheduled retry cycles.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Maximum concurrent sends within one chunk of a cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Connection checks fire every `heartbeat_multiplier` retry intervals.
    #[serde(default = "default_heartbeat_multiplier")]
    pub heartbeat_multiplier: u32,
    /// Queue retention and backoff.
    #[serde(default)]
    pub queue: QueueSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_heartbeat_multiplier() -> u32 {
    DEFAULT_HEARTBEAT_MULTIPLIER
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            heartbeat_multiplier: DEFAULT_HEARTBEAT_MULTIPLIER,
            queue: QueueSettings::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables are applied on top of whatever the file holds.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject values the retry scheduler cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.retry_interval_ms == 0 {
            return Err(CoreError::Config(
                "retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Config(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_multiplier == 0 {
            return Err(CoreError::Config(
                "heartbeat_multiplier must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between scheduled retry cycles.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `TELEMETRY_*` overrides from the given lookup.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup("TELEMETRY_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(interval) = lookup("TELEMETRY_RETRY_INTERVAL_MS").and_then(|v| v.parse().ok())
        {
            self.retry_interval_ms = interval;
        }
        if let Some(batch_size) = lookup("TELEMETRY_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.batch_size = batch_size;
        }
    }
}
