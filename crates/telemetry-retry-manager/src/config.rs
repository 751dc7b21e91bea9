//! Retry manager configuration.

use crate::{RetryError, RetryResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use telemetry_config_and_utils::{Config, DEFAULT_HEARTBEAT_MULTIPLIER};

/// Invoked with the new connection status.
pub type ConnectionStatusCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Invoked with the queue size and whether it is above the warning threshold.
pub type QueueSizeCallback = Arc<dyn Fn(usize, bool) + Send + Sync>;

/// Immutable retry manager configuration.
///
/// Callbacks are fire-and-forget notifications and may be invoked
/// repeatedly with the same value.
#[derive(Clone)]
pub struct RetryManagerConfig {
    /// Time between scheduled retry cycles.
    pub retry_interval: Duration,
    /// Maximum sends in flight at once within a cycle.
    pub batch_size: usize,
    /// A connection check fires every `heartbeat_multiplier` retry intervals.
    pub heartbeat_multiplier: u32,
    /// Connection status notifications.
    pub on_connection_status_change: ConnectionStatusCallback,
    /// Queue size notifications.
    pub on_queue_size_change: QueueSizeCallback,
}

impl RetryManagerConfig {
    /// Create a config with no-op callbacks and the default heartbeat cadence.
    pub fn new(retry_interval: Duration, batch_size: usize) -> Self {
        Self {
            retry_interval,
            batch_size,
            heartbeat_multiplier: DEFAULT_HEARTBEAT_MULTIPLIER,
            on_connection_status_change: Arc::new(|_| {}),
            on_queue_size_change: Arc::new(|_, _| {}),
        }
    }

    /// Build from the loaded delivery configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_interval(), config.batch_size)
            .with_heartbeat_multiplier(config.heartbeat_multiplier)
    }

    /// Set the heartbeat cadence in retry intervals.
    pub fn with_heartbeat_multiplier(mut self, multiplier: u32) -> Self {
        self.heartbeat_multiplier = multiplier;
        self
    }

    /// Set the connection status callback.
    pub fn on_connection_status_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_connection_status_change = Arc::new(callback);
        self
    }

    /// Set the queue size callback.
    pub fn on_queue_size_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, bool) + Send + Sync + 'static,
    {
        self.on_queue_size_change = Arc::new(callback);
        self
    }

    /// Time between connection checks.
    pub fn heartbeat_interval(&self) -> Duration {
        self.retry_interval.saturating_mul(self.heartbeat_multiplier)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> RetryResult<()> {
        if self.retry_interval.is_zero() {
            return Err(RetryError::Config(
                "retry interval must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RetryError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_multiplier == 0 {
            return Err(RetryError::Config(
                "heartbeat multiplier must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for RetryManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryManagerConfig")
            .field("retry_interval", &self.retry_interval)
            .field("batch_size", &self.batch_size)
            .field("heartbeat_multiplier", &self.heartbeat_multiplier)
            .finish_non_exhaustive()
    }
}
