//! Message types for the queue abstraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message in the queue.
///
/// The underlying format is implementation-specific (e.g.
/// `<timestamp>-<sequence>` for stream-backed queues, a receipt handle for
/// SQS-style queues).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a new `MessageId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message received from the queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// The topic this message was published to.
    pub topic: String,
    /// Raw payload bytes, typically serialized JSON.
    pub payload: Vec<u8>,
    /// When the message was published.
    pub timestamp: DateTime<Utc>,
    /// How many times this message has been delivered, including this one.
    pub delivery_count: u32,
}

impl QueueMessage {
    /// Attempts to deserialize the payload as JSON.
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Health status of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Whether the queue connection is active.
    pub connected: bool,
    /// Messages waiting to be delivered.
    pub pending_messages: u64,
    /// Messages currently leased to workers.
    pub in_flight_messages: u64,
    /// Messages on the dead-letter path.
    pub dead_lettered: u64,
}

impl QueueHealth {
    /// Creates a healthy status.
    pub fn healthy(pending: u64, in_flight: u64, dead_lettered: u64) -> Self {
        Self {
            connected: true,
            pending_messages: pending,
            in_flight_messages: in_flight,
            dead_lettered,
        }
    }

    /// Creates a disconnected status.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            pending_messages: 0,
            in_flight_messages: 0,
            dead_lettered: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_display() {
        let id = MessageId::new("1700000000-4");
        assert_eq!(id.as_str(), "1700000000-4");
        assert_eq!(id.to_string(), "1700000000-4");
    }

    #[test]
    fn test_message_deserialization() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            value: i32,
        }

        let message = QueueMessage {
            id: MessageId::new("1"),
            topic: "test".to_string(),
            payload: serde_json::to_vec(&serde_json::json!({"value": 42})).unwrap(),
            timestamp: Utc::now(),
            delivery_count: 1,
        };

        let parsed: Payload = message.deserialize().unwrap();
        assert_eq!(parsed.value, 42);
    }

    #[test]
    fn test_queue_health() {
        let health = QueueHealth::healthy(3, 1, 0);
        assert!(health.connected);
        assert_eq!(health.pending_messages, 3);

        assert!(!QueueHealth::disconnected().connected);
    }
}
