//! Retry manager error types.

use telemetry_event_queue::QueueError;
use thiserror::Error;

/// Retry manager error type.
#[derive(Error, Debug)]
pub enum RetryError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Queue could not be opened
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result type alias using RetryError.
pub type RetryResult<T> = Result<T, RetryError>;

/// A rejected send. Always treated as transient and retried later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SendError {
    /// Human-readable failure reason, recorded on the queued event.
    pub message: String,
}

impl SendError {
    /// Create a send error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
