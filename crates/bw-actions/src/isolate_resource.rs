//! Resource isolation playbook.
//!
//! Responds to resource-compromise signals: apply a quarantine security
//! group, snapshot the resource for forensics, and notify the security
//! team.

use crate::action::{ActionContext, ActionError, ActionOutput, RemediationAction};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

/// Network-quarantines a compromised resource.
pub struct IsolateResourceAction {
    // A real deployment holds a cloud/network connector here.
}

impl IsolateResourceAction {
    /// Creates a new resource isolation action.
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for IsolateResourceAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemediationAction for IsolateResourceAction {
    fn name(&self) -> &str {
        "isolate_resource"
    }

    fn description(&self) -> &str {
        "Quarantines a resource and captures a forensic snapshot"
    }

    #[instrument(skip(self, context), fields(incident_id = %context.incident_id))]
    async fn execute(&self, context: &ActionContext) -> Result<ActionOutput, ActionError> {
        // The resource under the entity's control, when the event named
        // one; otherwise the entity itself is the isolation target.
        let resource_id = context
            .params
            .get("resource_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&context.entity_id);

        info!("Applying quarantine security group to {}", resource_id);
        info!("Creating forensic snapshot of {}", resource_id);
        info!("Notifying security team about {}", resource_id);

        warn!("IsolateResourceAction is a placeholder - no cloud connector configured");

        Ok(ActionOutput {
            detail: format!("isolated {}", resource_id),
            steps: vec![
                "quarantined".to_string(),
                "snapshot_created".to_string(),
                "team_notified".to_string(),
            ],
        })
    }
}
