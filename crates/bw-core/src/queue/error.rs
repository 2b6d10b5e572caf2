//! Error types for the queue abstraction.

use thiserror::Error;

/// Errors that can occur in queue operations.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Failed to connect to or communicate with the queue.
    /// Transient; retry with backoff.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out waiting for a response. Transient.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Payload could not be serialized or deserialized. Permanent.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The message id does not exist, was already acknowledged, or its
    /// lease expired and it was claimed by another worker.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The topic name is unknown or invalid.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Catch-all for failures that fit no other category.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl QueueError {
    /// Returns `true` if the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Returns the error kind as a static string for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::MessageNotFound(_) => "message_not_found",
            Self::InvalidTopic(_) => "invalid_topic",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(QueueError::Connection("down".into()).is_transient());
        assert!(QueueError::Timeout("slow".into()).is_transient());
        assert!(!QueueError::Serialization("bad".into()).is_transient());
        assert!(!QueueError::MessageNotFound("gone".into()).is_transient());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(QueueError::Connection("x".into()).kind(), "connection");
        assert_eq!(
            QueueError::MessageNotFound("x".into()).kind(),
            "message_not_found"
        );
    }
}
