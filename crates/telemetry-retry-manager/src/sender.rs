//! Injected send capability.

use crate::SendError;
use async_trait::async_trait;
use std::future::Future;
use telemetry_event_queue::TelemetryEvent;

/// Delivers one telemetry event to the remote collector.
///
/// Resolves `Ok` once the collector accepted the event. Timeouts and
/// cancellation are the implementation's concern; any `Err` counts as a
/// failed attempt. Heartbeat probes (`CONNECTION_CHECK`) go through the
/// same method.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Send a single event.
    async fn send_event(&self, event: &TelemetryEvent) -> Result<(), SendError>;
}

/// Adapts an async closure into an [`EventSender`].
pub struct FnSender<F> {
    send: F,
}

impl<F> FnSender<F> {
    /// Wrap a closure taking an owned event.
    pub fn new(send: F) -> Self {
        Self { send }
    }
}

#[async_trait]
impl<F, Fut> EventSender for FnSender<F>
where
    F: Fn(TelemetryEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SendError>> + Send + 'static,
{
    async fn send_event(&self, event: &TelemetryEvent) -> Result<(), SendError> {
        (self.send)(event.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fn_sender_forwards_events() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sender = FnSender::new(move |event: TelemetryEvent| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if event.name.as_str() == "bad" {
                    Err(SendError::new("HTTP 400"))
                } else {
                    Ok(())
                }
            }
        });

        assert!(sender.send_event(&TelemetryEvent::named("good")).await.is_ok());
        let err = sender
            .send_event(&TelemetryEvent::named("bad"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "HTTP 400");
        assert_eq!(err.to_string(), "HTTP 400");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
