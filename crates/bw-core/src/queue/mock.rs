//! In-memory queue implementation.
//!
//! Faithful to the contract the pipeline relies on: at-least-once delivery
//! with a visibility lease, explicit acknowledgment, and a dead-letter
//! buffer. Used by tests and single-process runs.

use super::error::QueueError;
use super::types::{MessageId, QueueHealth, QueueMessage};
use super::EventQueue;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct Entry {
    message: QueueMessage,
    /// The message is deliverable once `Instant::now() >= visible_at`.
    visible_at: Instant,
}

#[derive(Default)]
struct TopicState {
    entries: Vec<Entry>,
    dead_letters: Vec<(QueueMessage, String)>,
}

/// In-memory [`EventQueue`] with lease-based redelivery.
pub struct MockEventQueue {
    topics: Mutex<HashMap<String, TopicState>>,
    sequence: AtomicU64,
}

impl MockEventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns dead-lettered messages and reasons for a topic. Test hook.
    pub async fn dead_letters(&self, topic: &str) -> Vec<(QueueMessage, String)> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|t| t.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Returns the number of messages still held by a topic (visible or
    /// leased). Test hook.
    pub async fn remaining(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map(|t| t.entries.len()).unwrap_or(0)
    }
}

impl Default for MockEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventQueue for MockEventQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        if topic.is_empty() {
            return Err(QueueError::InvalidTopic("empty topic name".to_string()));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = MessageId::new(format!("{}-{}", Utc::now().timestamp_millis(), seq));

        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        state.entries.push(Entry {
            message: QueueMessage {
                id: id.clone(),
                topic: topic.to_string(),
                payload: payload.to_vec(),
                timestamp: Utc::now(),
                delivery_count: 0,
            },
            visible_at: Instant::now(),
        });
        debug!(topic = %topic, id = %id, "Published message");
        Ok(id)
    }

    async fn receive(
        &self,
        topic: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let mut topics = self.topics.lock().await;
        let state = match topics.get_mut(topic) {
            Some(state) => state,
            None => return Ok(None),
        };

        let now = Instant::now();
        for entry in state.entries.iter_mut() {
            if entry.visible_at <= now {
                entry.visible_at = now + lease;
                entry.message.delivery_count += 1;
                return Ok(Some(entry.message.clone()));
            }
        }
        Ok(None)
    }

    async fn acknowledge(&self, topic: &str, id: &MessageId) -> Result<(), QueueError> {
        let mut topics = self.topics.lock().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::InvalidTopic(topic.to_string()))?;

        let before = state.entries.len();
        state.entries.retain(|e| &e.message.id != id);
        if state.entries.len() == before {
            return Err(QueueError::MessageNotFound(id.to_string()));
        }
        debug!(topic = %topic, id = %id, "Acknowledged message");
        Ok(())
    }

    async fn dead_letter(
        &self,
        topic: &str,
        id: &MessageId,
        reason: &str,
    ) -> Result<(), QueueError> {
        let mut topics = self.topics.lock().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::InvalidTopic(topic.to_string()))?;

        let pos = state
            .entries
            .iter()
            .position(|e| &e.message.id == id)
            .ok_or_else(|| QueueError::MessageNotFound(id.to_string()))?;
        let entry = state.entries.remove(pos);
        debug!(topic = %topic, id = %id, reason = %reason, "Dead-lettered message");
        state
            .dead_letters
            .push((entry.message, reason.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let topics = self.topics.lock().await;
        let now = Instant::now();
        let mut pending = 0u64;
        let mut in_flight = 0u64;
        let mut dead = 0u64;
        for state in topics.values() {
            for entry in &state.entries {
                if entry.visible_at <= now {
                    pending += 1;
                } else {
                    in_flight += 1;
                }
            }
            dead += state.dead_letters.len() as u64;
        }
        Ok(QueueHealth::healthy(pending, in_flight, dead))
    }
}
