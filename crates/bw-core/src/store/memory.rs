//! In-memory incident store.
//!
//! Reference implementation of [`IncidentStore`] backed by a
//! `tokio::sync::RwLock`. Suitable for tests and single-instance runs; a
//! database-backed implementation would plug in behind the same trait.

use super::{IncidentStore, StoreError};
use crate::incident::{Incident, IncidentState, PlaybookExecution};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    incidents: HashMap<Uuid, Incident>,
    executions: HashMap<Uuid, Vec<PlaybookExecution>>,
}

/// In-memory [`IncidentStore`].
pub struct MemoryIncidentStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryIncidentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes all operations fail with [`StoreError::Unavailable`] until
    /// cleared. Test hook for the redelivery path.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryIncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.incidents.get(&incident_id).cloned())
    }

    async fn create(&self, incident: Incident) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        if inner.incidents.contains_key(&incident.incident_id) {
            return Err(StoreError::AlreadyExists(incident.incident_id));
        }
        debug!(incident_id = %incident.incident_id, "Created incident");
        inner.incidents.insert(incident.incident_id, incident);
        Ok(())
    }

    async fn transition(
        &self,
        incident_id: Uuid,
        expected: IncidentState,
        new: IncidentState,
    ) -> Result<Incident, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let incident = inner
            .incidents
            .get_mut(&incident_id)
            .ok_or(StoreError::NotFound(incident_id))?;

        if incident.state != expected {
            return Err(StoreError::StateConflict {
                incident_id,
                expected,
                actual: incident.state,
            });
        }
        if !expected.can_transition_to(new) {
            return Err(StoreError::IllegalTransition {
                incident_id,
                from: expected,
                to: new,
            });
        }

        incident.state = new;
        if new == IncidentState::Completed {
            incident.resolved_at = Some(Utc::now());
        }
        debug!(incident_id = %incident_id, from = %expected, to = %new, "Transitioned incident");
        Ok(incident.clone())
    }

    async fn append_execution(&self, record: PlaybookExecution) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        if !inner.incidents.contains_key(&record.incident_id) {
            return Err(StoreError::NotFound(record.incident_id));
        }
        let rows = inner.executions.entry(record.incident_id).or_default();
        if let Some(last) = rows.last() {
            if record.attempt_number <= last.attempt_number {
                return Err(StoreError::NonMonotonicAttempt {
                    incident_id: record.incident_id,
                    attempt_number: record.attempt_number,
                });
            }
        }
        rows.push(record);
        Ok(())
    }

    async fn executions(&self, incident_id: Uuid) -> Result<Vec<PlaybookExecution>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .executions
            .get(&incident_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn snapshot(&self) -> Result<Vec<Incident>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.incidents.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{ApprovalMode, ExecutionStatus};
    use crate::playbook::PlaybookKind;
    use std::sync::Arc;

    fn incident(id: Uuid) -> Incident {
        Incident::new(
            id,
            "alice@example.com",
            80,
            ApprovalMode::Auto,
            PlaybookKind::UserLockdown,
        )
    }

    fn execution(id: Uuid, attempt: u32, status: ExecutionStatus) -> PlaybookExecution {
        PlaybookExecution {
            incident_id: id,
            playbook: PlaybookKind::UserLockdown,
            attempt_number: attempt,
            status,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            error_detail: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.incident_id, id);
        assert_eq!(fetched.state, IncidentState::PendingDecision);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        assert!(matches!(
            store.create(incident(id)).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_cas_succeeds() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        let updated = store
            .transition(id, IncidentState::PendingDecision, IncidentState::AutoApproved)
            .await
            .unwrap();
        assert_eq!(updated.state, IncidentState::AutoApproved);
    }

    #[tokio::test]
    async fn test_transition_state_conflict() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();
        store
            .transition(id, IncidentState::PendingDecision, IncidentState::AutoApproved)
            .await
            .unwrap();

        let err = store
            .transition(id, IncidentState::PendingDecision, IncidentState::ManualReview)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_transition_rejects_illegal_edge() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        let err = store
            .transition(id, IncidentState::PendingDecision, IncidentState::Executing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_completed_stamps_resolved_at() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();
        store
            .transition(id, IncidentState::PendingDecision, IncidentState::AutoApproved)
            .await
            .unwrap();
        store
            .transition(id, IncidentState::AutoApproved, IncidentState::Executing)
            .await
            .unwrap();
        let done = store
            .transition(id, IncidentState::Executing, IncidentState::Completed)
            .await
            .unwrap();

        assert!(done.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_transitions_single_winner() {
        let store = Arc::new(MemoryIncidentStore::new());
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .transition(id, IncidentState::PendingDecision, IncidentState::AutoApproved)
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(StoreError::StateConflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn test_execution_attempts_strictly_increasing() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        store
            .append_execution(execution(id, 1, ExecutionStatus::Failed))
            .await
            .unwrap();
        store
            .append_execution(execution(id, 2, ExecutionStatus::Succeeded))
            .await
            .unwrap();

        assert!(matches!(
            store
                .append_execution(execution(id, 2, ExecutionStatus::Failed))
                .await,
            Err(StoreError::NonMonotonicAttempt { .. })
        ));

        let rows = store.executions(id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.windows(2).all(|w| w[0].attempt_number < w[1].attempt_number));
    }

    #[tokio::test]
    async fn test_execution_for_unknown_incident_fails() {
        let store = MemoryIncidentStore::new();
        assert!(matches!(
            store
                .append_execution(execution(Uuid::new_v4(), 1, ExecutionStatus::Failed))
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time_clone() {
        let store = MemoryIncidentStore::new();
        let id = Uuid::new_v4();
        store.create(incident(id)).await.unwrap();

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.len(), 1);

        store
            .transition(id, IncidentState::PendingDecision, IncidentState::ManualReview)
            .await
            .unwrap();
        // The earlier snapshot is unaffected.
        assert_eq!(snap[0].state, IncidentState::PendingDecision);
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_error() {
        let store = MemoryIncidentStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
