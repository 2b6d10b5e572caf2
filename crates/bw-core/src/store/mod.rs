//! The mutation-guarded incident record.
//!
//! All incident state changes pass through the compare-and-swap
//! [`IncidentStore::transition`]; no other component writes incident state
//! directly. The CAS is what makes single-writer-per-incident hold under
//! concurrent delivery: the loser of a race observes
//! [`StoreError::StateConflict`] and drops its attempt.

pub mod memory;

pub use memory::MemoryIncidentStore;

use crate::incident::{Incident, IncidentState, PlaybookExecution};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by incident store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No incident with the given id.
    #[error("incident not found: {0}")]
    NotFound(Uuid),

    /// An incident with the given id already exists.
    #[error("incident already exists: {0}")]
    AlreadyExists(Uuid),

    /// The compare-and-swap expectation did not hold.
    ///
    /// Expected under concurrency: another worker already advanced the
    /// incident. The caller drops its attempt, it does not retry.
    #[error("state conflict on {incident_id}: expected {expected}, found {actual}")]
    StateConflict {
        incident_id: Uuid,
        expected: IncidentState,
        actual: IncidentState,
    },

    /// The requested transition is not in the state machine.
    #[error("illegal transition on {incident_id}: {from} -> {to}")]
    IllegalTransition {
        incident_id: Uuid,
        from: IncidentState,
        to: IncidentState,
    },

    /// Execution attempt numbers must be strictly increasing.
    #[error("non-monotonic attempt {attempt_number} for incident {incident_id}")]
    NonMonotonicAttempt {
        incident_id: Uuid,
        attempt_number: u32,
    },

    /// The backing store cannot be reached.
    ///
    /// Fatal for the current message: the caller must not acknowledge it
    /// and relies on redelivery.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Shared, mutation-guarded record of incidents and their executions.
///
/// Incidents are append-only from an audit perspective: they are created
/// once, advanced through [`transition`](Self::transition), and never
/// deleted.
#[async_trait]
pub trait IncidentStore: Send + Sync + 'static {
    /// Fetches an incident by id.
    async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>, StoreError>;

    /// Creates a new incident.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the id is taken, which
    /// is how duplicate delivery is detected.
    async fn create(&self, incident: Incident) -> Result<(), StoreError>;

    /// Atomically advances an incident from `expected` to `new`.
    ///
    /// This is the sole mutation primitive. Fails with
    /// [`StoreError::StateConflict`] when the current state is not
    /// `expected`, and with [`StoreError::IllegalTransition`] when the
    /// state machine does not admit the edge. Entering
    /// [`IncidentState::Completed`] stamps `resolved_at`.
    async fn transition(
        &self,
        incident_id: Uuid,
        expected: IncidentState,
        new: IncidentState,
    ) -> Result<Incident, StoreError>;

    /// Appends an execution record for an incident.
    ///
    /// Attempt numbers must be strictly increasing per incident.
    async fn append_execution(&self, record: PlaybookExecution) -> Result<(), StoreError>;

    /// Returns all execution records for an incident, in append order.
    async fn executions(&self, incident_id: Uuid) -> Result<Vec<PlaybookExecution>, StoreError>;

    /// Returns a point-in-time snapshot of all incidents.
    ///
    /// Read-only; used by the reporting consumer. Never blocks writers
    /// beyond the snapshot read itself.
    async fn snapshot(&self) -> Result<Vec<Incident>, StoreError>;
}
