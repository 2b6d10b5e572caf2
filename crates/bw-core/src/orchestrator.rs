//! Playbook orchestration.
//!
//! The orchestrator drives each incident through its state machine: decide
//! auto-approval against the configured threshold, execute the selected
//! playbook through the [`ActionExecutor`] collaborator with bounded retry
//! and exponential backoff, and escalate when retries are exhausted.
//!
//! Every state change goes through the store's compare-and-swap
//! transition. Losing a CAS race means another worker already advanced the
//! incident; the loser logs at debug level and drops its attempt.

use crate::config::PipelineConfig;
use crate::event::SecurityEvent;
use crate::incident::{
    ApprovalMode, ExecutionStatus, Incident, IncidentState, PlaybookExecution,
};
use crate::playbook::{ActionExecutor, IdempotencyKey, PlaybookKind};
use crate::scoring::RiskAssessment;
use crate::store::{IncidentStore, StoreError};
use bw_observability::PipelineMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors that can occur in the orchestrator.
///
/// State conflicts are not errors: they are resolved internally by
/// dropping the losing attempt. A propagated [`StoreError::Unavailable`]
/// tells the worker not to acknowledge the message.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("incident not found: {0}")]
    IncidentNotFound(Uuid),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What the orchestrator did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Execution ran to a terminal state (`Completed` or `Escalated`).
    Executed(IncidentState),
    /// Parked in `ManualReview`, awaiting an external approval signal.
    AwaitingApproval,
    /// Redelivery of an incident already past the initial state; no-op.
    Duplicate,
    /// Another worker advanced the incident first; this attempt dropped.
    Conflict,
}

/// Drives incidents from assessment to resolution.
pub struct PlaybookOrchestrator {
    store: Arc<dyn IncidentStore>,
    executor: Arc<dyn ActionExecutor>,
    config: PipelineConfig,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PlaybookOrchestrator {
    /// Creates an orchestrator.
    ///
    /// The configuration is assumed validated at startup
    /// ([`PipelineConfig::validate`]).
    pub fn new(
        store: Arc<dyn IncidentStore>,
        executor: Arc<dyn ActionExecutor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            metrics: None,
        }
    }

    /// Attaches a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handles a risk assessment delivery.
    ///
    /// Creates the incident on first delivery, decides auto-approval vs
    /// manual review, and runs execution for auto-approved incidents.
    /// Redelivery for an incident already past `PendingDecision` is a
    /// no-op.
    #[instrument(skip(self, event, assessment), fields(incident_id = %assessment.event_id))]
    pub async fn handle_assessment(
        &self,
        event: &SecurityEvent,
        assessment: &RiskAssessment,
    ) -> Result<Outcome, OrchestratorError> {
        let incident_id = assessment.event_id;
        let approval_mode = if assessment.score >= self.config.auto_approval_threshold {
            ApprovalMode::Auto
        } else {
            ApprovalMode::Manual
        };
        let playbook = PlaybookKind::select_for_event(&event.event_name);

        let incident = Incident::new(
            incident_id,
            assessment.entity_id.clone(),
            assessment.score,
            approval_mode,
            playbook,
        );

        match self.store.create(incident.clone()).await {
            Ok(()) => {
                info!(
                    score = assessment.score,
                    mode = ?approval_mode,
                    playbook = %playbook,
                    "Created incident"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_incident_opened(assessment.score);
                    metrics.record_incident_state("pending_decision");
                }
            }
            Err(StoreError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .get(incident_id)
                    .await?
                    .ok_or(OrchestratorError::IncidentNotFound(incident_id))?;
                if existing.state != IncidentState::PendingDecision {
                    debug!(state = %existing.state, "Duplicate delivery for advanced incident, skipping");
                    return Ok(Outcome::Duplicate);
                }
                // A previous worker created the incident but died before
                // deciding; fall through and take the decision.
            }
            Err(e) => return Err(e.into()),
        }

        match approval_mode {
            ApprovalMode::Auto => {
                if self
                    .transition(incident_id, IncidentState::PendingDecision, IncidentState::AutoApproved)
                    .await?
                    .is_none()
                {
                    return Ok(Outcome::Conflict);
                }
                if self
                    .transition(incident_id, IncidentState::AutoApproved, IncidentState::Executing)
                    .await?
                    .is_none()
                {
                    return Ok(Outcome::Conflict);
                }
                self.run_execution(&incident).await
            }
            ApprovalMode::Manual => {
                if self
                    .transition(incident_id, IncidentState::PendingDecision, IncidentState::ManualReview)
                    .await?
                    .is_none()
                {
                    return Ok(Outcome::Conflict);
                }
                info!(score = assessment.score, "Deferred to manual review");
                Ok(Outcome::AwaitingApproval)
            }
        }
    }

    /// Handles an external approval signal for an incident in manual
    /// review.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn handle_approval(
        &self,
        incident_id: Uuid,
        approver: &str,
    ) -> Result<Outcome, OrchestratorError> {
        let incident = self
            .store
            .get(incident_id)
            .await?
            .ok_or(OrchestratorError::IncidentNotFound(incident_id))?;

        if self
            .transition(incident_id, IncidentState::ManualReview, IncidentState::Executing)
            .await?
            .is_none()
        {
            return Ok(Outcome::Conflict);
        }
        info!(approver = %approver, "Manual approval received, executing");
        self.run_execution(&incident).await
    }

    /// Runs the execution loop for an incident already in `Executing`.
    async fn run_execution(&self, incident: &Incident) -> Result<Outcome, OrchestratorError> {
        let incident_id = incident.incident_id;
        let playbook = incident.playbook;
        let params = serde_json::json!({ "entity_id": incident.entity_id });

        let mut attempt: u32 = 1;
        loop {
            let key = IdempotencyKey::new(incident_id, attempt);
            let started_at = Utc::now();
            let started = std::time::Instant::now();

            // Bounded like every collaborator call; a stuck connector is
            // indistinguishable from a failed attempt.
            let action_timeout = Duration::from_secs(self.config.action_timeout_secs);
            let result = match tokio::time::timeout(
                action_timeout,
                self.executor.execute(playbook, key, &params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => crate::playbook::ExecutionResult::failure(format!(
                    "execution timed out after {}s",
                    self.config.action_timeout_secs
                )),
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_playbook_duration(playbook.as_str(), started.elapsed().as_secs_f64());
            }

            if result.success {
                self.store
                    .append_execution(PlaybookExecution {
                        incident_id,
                        playbook,
                        attempt_number: attempt,
                        status: ExecutionStatus::Succeeded,
                        started_at,
                        finished_at: Some(Utc::now()),
                        error_detail: None,
                    })
                    .await?;
                if self
                    .transition(incident_id, IncidentState::Executing, IncidentState::Completed)
                    .await?
                    .is_none()
                {
                    return Ok(Outcome::Conflict);
                }
                info!(playbook = %playbook, attempt, "Playbook completed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_action(playbook.as_str(), "succeeded");
                    metrics.record_incident_state("completed");
                    metrics.record_incident_closed(incident.risk_score);
                }
                return Ok(Outcome::Executed(IncidentState::Completed));
            }

            let exhausted = attempt >= self.config.max_retries;
            warn!(
                playbook = %playbook,
                attempt,
                exhausted,
                detail = %result.detail,
                "Playbook attempt failed"
            );
            self.store
                .append_execution(PlaybookExecution {
                    incident_id,
                    playbook,
                    attempt_number: attempt,
                    // A failure that will be retried is marked Retrying;
                    // only the last attempt carries Failed.
                    status: if exhausted {
                        ExecutionStatus::Failed
                    } else {
                        ExecutionStatus::Retrying
                    },
                    started_at,
                    finished_at: Some(Utc::now()),
                    error_detail: Some(result.detail.clone()),
                })
                .await?;
            if let Some(metrics) = &self.metrics {
                metrics.record_action(playbook.as_str(), "failed");
            }

            if self
                .transition(incident_id, IncidentState::Executing, IncidentState::Failed)
                .await?
                .is_none()
            {
                return Ok(Outcome::Conflict);
            }

            if exhausted {
                if self
                    .transition(incident_id, IncidentState::Failed, IncidentState::Escalated)
                    .await?
                    .is_none()
                {
                    return Ok(Outcome::Conflict);
                }
                warn!(playbook = %playbook, attempts = attempt, "Retries exhausted, escalated");
                if let Some(metrics) = &self.metrics {
                    metrics.record_incident_state("escalated");
                    metrics.record_incident_closed(incident.risk_score);
                }
                return Ok(Outcome::Executed(IncidentState::Escalated));
            }

            if self
                .transition(incident_id, IncidentState::Failed, IncidentState::Executing)
                .await?
                .is_none()
            {
                return Ok(Outcome::Conflict);
            }

            tokio::time::sleep(self.backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    /// Exponential backoff before retry `attempt + 1`. Deterministic: any
    /// jitter belongs to the collaborators, not the decision path.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = (attempt - 1).min(16);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(1 << shift))
    }

    /// CAS transition that absorbs state conflicts.
    ///
    /// Returns `Ok(None)` when another worker already advanced the
    /// incident; every other store failure propagates.
    async fn transition(
        &self,
        incident_id: Uuid,
        expected: IncidentState,
        new: IncidentState,
    ) -> Result<Option<Incident>, OrchestratorError> {
        match self.store.transition(incident_id, expected, new).await {
            Ok(incident) => Ok(Some(incident)),
            Err(StoreError::StateConflict {
                expected, actual, ..
            }) => {
                debug!(
                    incident_id = %incident_id,
                    expected = %expected,
                    actual = %actual,
                    "Transition lost to another worker, dropping attempt"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_state_conflict();
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
