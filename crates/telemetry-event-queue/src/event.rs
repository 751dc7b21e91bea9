//! Telemetry event and queue record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved event name for heartbeat connection probes.
pub const CONNECTION_CHECK: &str = "CONNECTION_CHECK";

/// Name of a telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventName(String);

impl EventName {
    /// Create an event name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// An opaque telemetry record produced by the host application.
///
/// The payload is never interpreted here; it is persisted and handed
/// back to the sender unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name.
    pub name: EventName,
    /// Arbitrary event properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl TelemetryEvent {
    /// Create an event with properties.
    pub fn new(name: impl Into<EventName>, properties: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Create an event without properties.
    pub fn named(name: impl Into<EventName>) -> Self {
        Self::new(name, Map::new())
    }

    /// Build a heartbeat probe.
    pub fn connection_check() -> Self {
        let mut properties = Map::new();
        properties.insert("sentAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        Self::new(CONNECTION_CHECK, properties)
    }
}

/// A telemetry event persisted for redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Unique ID assigned at enqueue time.
    pub id: String,
    /// The payload to resend.
    pub event: TelemetryEvent,
    /// Most recent failure reason.
    pub reason: Option<String>,
    /// When the event was enqueued.
    pub timestamp: DateTime<Utc>,
    /// Failed send attempts so far.
    pub retry_count: u32,
    /// When the last failed attempt was recorded.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedEvent {
    /// Create a fresh record with a new ID and zero retries.
    pub fn new(event: TelemetryEvent, reason: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            reason,
            timestamp: Utc::now(),
            retry_count: 0,
            last_attempt_at: None,
        }
    }
}

/// Snapshot of queue size for backpressure signaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMetadata {
    /// Number of queued events.
    pub size: usize,
    /// Whether `size` exceeds the configured warning threshold.
    pub is_above_warning_threshold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_check_event() {
        let event = TelemetryEvent::connection_check();
        assert_eq!(event.name.as_str(), CONNECTION_CHECK);
        assert!(event.properties.contains_key("sentAt"));
    }

    #[test]
    fn test_queued_event_new() {
        let first = QueuedEvent::new(TelemetryEvent::named("a"), Some("timeout".into()));
        let second = QueuedEvent::new(TelemetryEvent::named("a"), None);

        assert_ne!(first.id, second.id);
        assert_eq!(first.retry_count, 0);
        assert!(first.last_attempt_at.is_none());
        assert_eq!(first.reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_event_serializes_name_as_string() {
        let mut properties = Map::new();
        properties.insert("durationMs".to_string(), json!(120));
        let event = TelemetryEvent::new("command.run", properties);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "name": "command.run", "properties": { "durationMs": 120 } }));
    }

    #[test]
    fn test_event_deserializes_without_properties() {
        let event: TelemetryEvent = serde_json::from_str(r#"{ "name": "x" }"#).unwrap();
        assert_eq!(event, TelemetryEvent::named("x"));
    }
}
