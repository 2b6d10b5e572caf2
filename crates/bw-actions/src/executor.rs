//! The orchestrator-facing action executor.
//!
//! Dispatches the closed set of playbooks onto their action
//! implementations and enforces attempt-level idempotency: a replayed
//! `(incident_id, attempt_number)` key returns the recorded outcome
//! without re-applying any action.

use crate::action::{ActionContext, RemediationAction};
use crate::isolate_resource::IsolateResourceAction;
use crate::user_lockdown::UserLockdownAction;
use async_trait::async_trait;
use bw_core::playbook::{ActionExecutor, ExecutionResult, IdempotencyKey, PlaybookKind};
use bw_observability::PipelineMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// [`ActionExecutor`] over the closed playbook set.
pub struct PlaybookActionExecutor {
    lockdown: Arc<dyn RemediationAction>,
    isolate: Arc<dyn RemediationAction>,
    applied: Mutex<HashMap<IdempotencyKey, ExecutionResult>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PlaybookActionExecutor {
    /// Creates an executor with the standard playbook actions.
    pub fn new() -> Self {
        Self {
            lockdown: Arc::new(UserLockdownAction::new()),
            isolate: Arc::new(IsolateResourceAction::new()),
            applied: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Creates an executor with custom action implementations.
    pub fn with_actions(
        lockdown: Arc<dyn RemediationAction>,
        isolate: Arc<dyn RemediationAction>,
    ) -> Self {
        Self {
            lockdown,
            isolate,
            applied: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Attaches a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn action_for(&self, playbook: PlaybookKind) -> &Arc<dyn RemediationAction> {
        match playbook {
            PlaybookKind::UserLockdown => &self.lockdown,
            PlaybookKind::IsolateResource => &self.isolate,
        }
    }
}

impl Default for PlaybookActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for PlaybookActionExecutor {
    #[instrument(skip(self, params), fields(playbook = %playbook, key = %key))]
    async fn execute(
        &self,
        playbook: PlaybookKind,
        key: IdempotencyKey,
        params: &serde_json::Value,
    ) -> ExecutionResult {
        {
            let applied = self.applied.lock().await;
            if let Some(previous) = applied.get(&key) {
                debug!("Replay of known attempt, returning recorded outcome");
                return previous.clone();
            }
        }

        let context = match ActionContext::from_params(key.incident_id, key.attempt_number, params)
        {
            Ok(context) => context,
            Err(e) => {
                // Bad parameters are stable across replays; record the
                // failure under the key like any other outcome.
                let result = ExecutionResult::failure(e.to_string());
                self.applied.lock().await.insert(key, result.clone());
                return result;
            }
        };

        let action = self.action_for(playbook);
        let result = match action.execute(&context).await {
            Ok(output) => {
                info!(action = action.name(), "Action completed");
                ExecutionResult::success(output.detail, output.steps)
            }
            Err(e) => ExecutionResult::failure(e.to_string()),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_action(
                playbook.as_str(),
                if result.success { "succeeded" } else { "failed" },
            );
        }

        self.applied.lock().await.insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionError, ActionOutput};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct CountingAction {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingAction {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl RemediationAction for CountingAction {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "Counts invocations"
        }

        async fn execute(&self, _context: &ActionContext) -> Result<ActionOutput, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ActionError::ExecutionFailed("scripted failure".to_string()))
            } else {
                Ok(ActionOutput {
                    detail: "done".to_string(),
                    steps: vec!["step".to_string()],
                })
            }
        }
    }

    fn params() -> serde_json::Value {
        serde_json::json!({"entity_id": "alice@example.com"})
    }

    #[tokio::test]
    async fn test_dispatches_lockdown_playbook() {
        let executor = PlaybookActionExecutor::new();
        let key = IdempotencyKey::new(Uuid::new_v4(), 1);

        let result = executor
            .execute(PlaybookKind::UserLockdown, key, &params())
            .await;
        assert!(result.success);
        assert!(result.actions_taken.contains(&"revoked_sessions".to_string()));
    }

    #[tokio::test]
    async fn test_dispatches_isolation_playbook() {
        let executor = PlaybookActionExecutor::new();
        let key = IdempotencyKey::new(Uuid::new_v4(), 1);

        let result = executor
            .execute(PlaybookKind::IsolateResource, key, &params())
            .await;
        assert!(result.success);
        assert!(result.actions_taken.contains(&"quarantined".to_string()));
    }

    #[tokio::test]
    async fn test_replayed_key_does_not_reapply() {
        let counting = Arc::new(CountingAction::new(false));
        let executor = PlaybookActionExecutor::with_actions(
            Arc::clone(&counting) as Arc<dyn RemediationAction>,
            Arc::new(IsolateResourceAction::new()),
        );
        let key = IdempotencyKey::new(Uuid::new_v4(), 1);

        let first = executor
            .execute(PlaybookKind::UserLockdown, key, &params())
            .await;
        let replay = executor
            .execute(PlaybookKind::UserLockdown, key, &params())
            .await;

        assert!(first.success);
        assert!(replay.success);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_attempt_number_reexecutes() {
        let counting = Arc::new(CountingAction::new(false));
        let executor = PlaybookActionExecutor::with_actions(
            Arc::clone(&counting) as Arc<dyn RemediationAction>,
            Arc::new(IsolateResourceAction::new()),
        );
        let incident_id = Uuid::new_v4();

        executor
            .execute(
                PlaybookKind::UserLockdown,
                IdempotencyKey::new(incident_id, 1),
                &params(),
            )
            .await;
        executor
            .execute(
                PlaybookKind::UserLockdown,
                IdempotencyKey::new(incident_id, 2),
                &params(),
            )
            .await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_action_failure_becomes_failed_result() {
        let executor = PlaybookActionExecutor::with_actions(
            Arc::new(CountingAction::new(true)),
            Arc::new(IsolateResourceAction::new()),
        );
        let key = IdempotencyKey::new(Uuid::new_v4(), 1);

        let result = executor
            .execute(PlaybookKind::UserLockdown, key, &params())
            .await;
        assert!(!result.success);
        assert!(result.detail.contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_missing_entity_id_fails_stably() {
        let executor = PlaybookActionExecutor::new();
        let key = IdempotencyKey::new(Uuid::new_v4(), 1);

        let first = executor
            .execute(PlaybookKind::UserLockdown, key, &serde_json::json!({}))
            .await;
        let replay = executor
            .execute(PlaybookKind::UserLockdown, key, &serde_json::json!({}))
            .await;

        assert!(!first.success);
        assert_eq!(first.detail, replay.detail);
    }
}
