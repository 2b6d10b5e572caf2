//! Incident data model.
//!
//! An [`Incident`] is the unit of remediation tracking, created on first
//! assessment delivery for an event and mutated only through the store's
//! compare-and-swap transition. Incidents are never deleted; terminal
//! states are retained as the audit trail.

use crate::playbook::PlaybookKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How execution of the selected playbook was authorized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// The risk score cleared the auto-approval threshold.
    Auto,
    /// A human approval signal is required before execution.
    Manual,
}

/// State of an incident in the remediation workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Created, decision not yet taken.
    PendingDecision,
    /// Cleared the auto-approval threshold.
    AutoApproved,
    /// Waiting for an external approval signal.
    ManualReview,
    /// A playbook attempt is in flight.
    Executing,
    /// The last attempt failed; eligible for bounded retry.
    Failed,
    /// Remediation succeeded. Terminal.
    Completed,
    /// Retries exhausted; requires human action. Terminal.
    Escalated,
}

impl IncidentState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentState::Completed | IncidentState::Escalated)
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: IncidentState) -> bool {
        use IncidentState::*;
        matches!(
            (self, next),
            (PendingDecision, AutoApproved)
                | (PendingDecision, ManualReview)
                | (AutoApproved, Executing)
                | (ManualReview, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Failed, Executing)
                | (Failed, Escalated)
        )
    }
}

impl std::fmt::Display for IncidentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentState::PendingDecision => write!(f, "pending_decision"),
            IncidentState::AutoApproved => write!(f, "auto_approved"),
            IncidentState::ManualReview => write!(f, "manual_review"),
            IncidentState::Executing => write!(f, "executing"),
            IncidentState::Failed => write!(f, "failed"),
            IncidentState::Completed => write!(f, "completed"),
            IncidentState::Escalated => write!(f, "escalated"),
        }
    }
}

/// The unit of remediation tracking, 1:1 with a scored event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Incident identity, equal to the originating event id.
    pub incident_id: Uuid,
    /// The actor or resource under review.
    pub entity_id: String,
    /// Risk score that drove the decision.
    pub risk_score: u8,
    /// Current workflow state.
    pub state: IncidentState,
    /// How execution was (or will be) authorized.
    pub approval_mode: ApprovalMode,
    /// The playbook selected for this incident.
    pub playbook: PlaybookKind,
    /// When the incident was created.
    pub created_at: DateTime<Utc>,
    /// When remediation completed. None until `Completed`.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Creates a new incident in the initial state.
    pub fn new(
        incident_id: Uuid,
        entity_id: impl Into<String>,
        risk_score: u8,
        approval_mode: ApprovalMode,
        playbook: PlaybookKind,
    ) -> Self {
        Self {
            incident_id,
            entity_id: entity_id.into(),
            risk_score,
            state: IncidentState::PendingDecision,
            approval_mode,
            playbook,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Status of a single playbook execution attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The attempt completed successfully.
    Succeeded,
    /// The attempt failed.
    Failed,
    /// The attempt failed and a retry is scheduled.
    Retrying,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Succeeded => write!(f, "succeeded"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// One row per attempted remediation action.
///
/// Attempt numbers are strictly increasing per incident; at most one
/// attempt is in flight per incident at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookExecution {
    /// The incident this attempt belongs to.
    pub incident_id: Uuid,
    /// The playbook that was run.
    pub playbook: PlaybookKind,
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// Outcome of the attempt.
    pub status: ExecutionStatus,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure detail, when the attempt did not succeed.
    pub error_detail: Option<String>,
}
