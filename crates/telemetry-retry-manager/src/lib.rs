//! Retry orchestration for telemetry that failed its primary send.
//!
//! This crate provides:
//! - RetryManager: timer-driven retry cycles with bounded send concurrency,
//!   connection-status inference and a heartbeat probe
//! - EventSender: the injected send capability, with a closure adapter
//!
//! ```ignore
//! let queue = Arc::new(EventQueue::open(&paths, QueuePolicy::from(&config.queue)).await?);
//! let sender = Arc::new(FnSender::new(|event| async move { collector.send(event).await }));
//! let manager = RetryManager::new(
//!     queue,
//!     sender,
//!     RetryManagerConfig::from_config(&config)
//!         .on_connection_status_change(|connected| tracing::info!(connected, "status")),
//! )?;
//! manager.start();
//! ```

mod config;
mod error;
mod manager;
mod sender;

#[cfg(test)]
mod tests;

pub use config::{ConnectionStatusCallback, QueueSizeCallback, RetryManagerConfig};
pub use error::{RetryError, RetryResult, SendError};
pub use manager::RetryManager;
pub use sender::{EventSender, FnSender};

pub use telemetry_event_queue::{
    EventQueue, QueueMetadata, QueuePolicy, QueuedEvent, RetryQueue, TelemetryEvent,
    CONNECTION_CHECK,
};
