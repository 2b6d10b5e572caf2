//! Durable queue abstraction.
//!
//! The pipeline treats its queue as an at-least-once, no-ordering delivery
//! channel with per-message acknowledgment (delete-on-success) and a
//! visibility lease: a message received but not acknowledged within its
//! lease becomes re-deliverable. Malformed messages are routed to a
//! dead-letter path instead of being retried.
//!
//! Workers poll with [`EventQueue::receive`]; an empty poll returns
//! `Ok(None)` rather than blocking forever, so the caller controls pacing
//! and backpressure.

pub mod error;
pub mod mock;
pub mod types;

pub use error::QueueError;
pub use mock::MockEventQueue;
pub use types::{MessageId, QueueHealth, QueueMessage};

use async_trait::async_trait;
use std::time::Duration;

/// Topic carrying raw provider event payloads.
pub const TOPIC_EVENTS: &str = "security.events";
/// Topic carrying manual approval signals.
pub const TOPIC_APPROVALS: &str = "security.approvals";

/// A durable message queue with lease-based at-least-once delivery.
#[async_trait]
pub trait EventQueue: Send + Sync + 'static {
    /// Publishes a message to a topic, returning its assigned id.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, QueueError>;

    /// Receives the next visible message from a topic, leasing it for
    /// `lease`. Returns `Ok(None)` when no message is currently visible.
    ///
    /// The message becomes re-deliverable when the lease expires without
    /// an [`acknowledge`](Self::acknowledge).
    async fn receive(
        &self,
        topic: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledges (deletes) a successfully processed message.
    async fn acknowledge(&self, topic: &str, id: &MessageId) -> Result<(), QueueError>;

    /// Removes a message from the topic and records it on the dead-letter
    /// path. Dead-lettered messages are never redelivered.
    async fn dead_letter(
        &self,
        topic: &str,
        id: &MessageId,
        reason: &str,
    ) -> Result<(), QueueError>;

    /// Reports queue connectivity and backlog.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}
