//! Playbook selection and the action-execution seam.
//!
//! Playbooks are a small closed set, selected by event classification
//! rather than open-ended name lookup. Execution is delegated to an
//! [`ActionExecutor`] collaborator; every attempt carries an idempotency
//! key so executor-side retries of the same attempt never double-apply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event names indicating a compromised resource rather than a
/// compromised identity.
pub const RESOURCE_COMPROMISE_ACTIONS: &[&str] = &[
    "AuthorizeSecurityGroupIngress",
    "ModifyInstanceAttribute",
    "DeleteBucket",
];

/// The closed set of remediation playbooks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookKind {
    /// Revoke active sessions, disable credentials, open a tracking record.
    UserLockdown,
    /// Network-quarantine the resource and snapshot it for forensics.
    IsolateResource,
}

impl PlaybookKind {
    /// Selects the playbook for an event.
    ///
    /// Resource-compromise actions isolate the resource; identity
    /// compromise and anything unclassified locks the actor down, so
    /// selection is total and every approved incident can execute.
    pub fn select_for_event(event_name: &str) -> Self {
        if RESOURCE_COMPROMISE_ACTIONS.contains(&event_name) {
            PlaybookKind::IsolateResource
        } else {
            PlaybookKind::UserLockdown
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybookKind::UserLockdown => "user_lockdown",
            PlaybookKind::IsolateResource => "isolate_resource",
        }
    }
}

impl std::fmt::Display for PlaybookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Idempotency key for one execution attempt.
///
/// The executor must treat a repeated key as the same attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub incident_id: Uuid,
    pub attempt_number: u32,
}

impl IdempotencyKey {
    /// Creates a key for an attempt.
    pub fn new(incident_id: Uuid, attempt_number: u32) -> Self {
        Self {
            incident_id,
            attempt_number,
        }
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.incident_id, self.attempt_number)
    }
}

/// Outcome of one playbook execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Human-readable outcome detail.
    pub detail: String,
    /// Steps the executor carried out, in order.
    pub actions_taken: Vec<String>,
}

impl ExecutionResult {
    /// Creates a successful result.
    pub fn success(detail: impl Into<String>, actions_taken: Vec<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            actions_taken,
        }
    }

    /// Creates a failed result.
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            actions_taken: Vec::new(),
        }
    }
}

/// Executes remediation playbooks on behalf of the orchestrator.
///
/// Implementations must be idempotent per [`IdempotencyKey`]: re-executing
/// the same `(incident_id, attempt_number)` pair must not double-apply any
/// action. Failure is an expected outcome, reported through
/// [`ExecutionResult`], not an `Err`.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    /// Runs one attempt of a playbook.
    async fn execute(
        &self,
        playbook: PlaybookKind,
        key: IdempotencyKey,
        params: &serde_json::Value,
    ) -> ExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_compromise_selects_isolation() {
        for action in RESOURCE_COMPROMISE_ACTIONS {
            assert_eq!(
                PlaybookKind::select_for_event(action),
                PlaybookKind::IsolateResource
            );
        }
    }

    #[test]
    fn test_identity_and_unknown_select_lockdown() {
        assert_eq!(
            PlaybookKind::select_for_event("CreateAccessKey"),
            PlaybookKind::UserLockdown
        );
        assert_eq!(
            PlaybookKind::select_for_event("AttachUserPolicy"),
            PlaybookKind::UserLockdown
        );
        assert_eq!(
            PlaybookKind::select_for_event("SomethingNovel"),
            PlaybookKind::UserLockdown
        );
    }

    #[test]
    fn test_idempotency_key_display() {
        let id = Uuid::nil();
        let key = IdempotencyKey::new(id, 3);
        assert_eq!(
            key.to_string(),
            "00000000-0000-0000-0000-000000000000#3"
        );
    }

    #[test]
    fn test_playbook_serde_names() {
        let json = serde_json::to_string(&PlaybookKind::UserLockdown).unwrap();
        assert_eq!(json, "\"user_lockdown\"");
        let back: PlaybookKind = serde_json::from_str("\"isolate_resource\"").unwrap();
        assert_eq!(back, PlaybookKind::IsolateResource);
    }
}
