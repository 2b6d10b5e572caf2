//! Remediation action trait.
//!
//! Each playbook is backed by one action implementation. Actions receive
//! the incident identity and attempt number so connector calls can be
//! made idempotent per attempt.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during action execution.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("connector error: {0}")]
    ConnectorError(String),
}

/// Context provided to actions during execution.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Incident this action is remediating.
    pub incident_id: Uuid,
    /// 1-based attempt number; together with `incident_id` this is the
    /// idempotency key.
    pub attempt_number: u32,
    /// The entity (actor or resource) being remediated.
    pub entity_id: String,
    /// Additional parameters from the orchestrator.
    pub params: serde_json::Value,
}

impl ActionContext {
    /// Creates a context from the orchestrator's parameters.
    ///
    /// Fails when the required `entity_id` parameter is missing.
    pub fn from_params(
        incident_id: Uuid,
        attempt_number: u32,
        params: &serde_json::Value,
    ) -> Result<Self, ActionError> {
        let entity_id = params
            .get("entity_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ActionError::InvalidParameters("missing required parameter: entity_id".to_string())
            })?
            .to_string();
        Ok(Self {
            incident_id,
            attempt_number,
            entity_id,
            params: params.clone(),
        })
    }
}

/// Output of a successful action.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    /// Human-readable summary.
    pub detail: String,
    /// Steps carried out, in order.
    pub steps: Vec<String>,
}

/// A fixed, named remediation procedure.
#[async_trait]
pub trait RemediationAction: Send + Sync {
    /// Returns the action name.
    fn name(&self) -> &str;

    /// Returns the action description.
    fn description(&self) -> &str;

    /// Executes the action.
    async fn execute(&self, context: &ActionContext) -> Result<ActionOutput, ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_requires_entity_id() {
        let err = ActionContext::from_params(Uuid::new_v4(), 1, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters(_)));
    }

    #[test]
    fn test_context_from_params() {
        let context = ActionContext::from_params(
            Uuid::new_v4(),
            2,
            &serde_json::json!({"entity_id": "alice@example.com"}),
        )
        .unwrap();
        assert_eq!(context.entity_id, "alice@example.com");
        assert_eq!(context.attempt_number, 2);
    }
}
