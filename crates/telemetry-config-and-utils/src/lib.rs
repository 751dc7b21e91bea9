//! Core configuration, paths, and logging for telemetry delivery.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, QueueSettings, DEFAULT_BATCH_SIZE, DEFAULT_HEARTBEAT_MULTIPLIER, DEFAULT_LOG_LEVEL,
    DEFAULT_RETRY_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with_config, parse_level, LogConfig};
pub use paths::Paths;
