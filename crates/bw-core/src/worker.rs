//! Pipeline workers.
//!
//! A pool of workers pulls from the queue and drives each message through
//! normalize -> score -> orchestrate, acknowledging on success. Malformed
//! events go to the dead-letter path; a store outage leaves the message
//! unacknowledged so the queue redelivers it. The pool caps in-flight
//! events with a semaphore; when saturated, the receive is simply not
//! issued, which surfaces as queue backlog.

use crate::config::PipelineConfig;
use crate::event::EventNormalizer;
use crate::orchestrator::{OrchestratorError, PlaybookOrchestrator};
use crate::queue::{EventQueue, QueueMessage, TOPIC_APPROVALS, TOPIC_EVENTS};
use crate::scoring::RiskScorer;
use crate::store::StoreError;
use bw_observability::PipelineMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How many deliveries an approval signal for an unknown incident gets
/// before it is parked on the dead-letter path. Covers approvals that
/// race ahead of their incident without letting bogus ids spin forever.
const MAX_APPROVAL_DELIVERIES: u32 = 5;

/// External approval decision for an incident in manual review.
///
/// Consumed from [`TOPIC_APPROVALS`] with the same at-least-once and
/// acknowledgment discipline as events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSignal {
    /// The incident being approved.
    pub incident_id: Uuid,
    /// Who approved it.
    pub approver: String,
}

/// A single pipeline worker.
struct PipelineWorker {
    id: usize,
    queue: Arc<dyn EventQueue>,
    normalizer: Arc<EventNormalizer>,
    scorer: Arc<RiskScorer>,
    orchestrator: Arc<PlaybookOrchestrator>,
    config: PipelineConfig,
    metrics: Option<Arc<PipelineMetrics>>,
    semaphore: Arc<Semaphore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PipelineWorker {
    async fn run(mut self) {
        info!(worker = self.id, "Pipeline worker started");
        let lease = Duration::from_secs(self.config.lease_secs);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            // The permit is the backpressure gate: no permit, no receive.
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let processed = self.poll_once(lease).await;
            drop(permit);

            if !processed {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(self.config.receive_idle_ms)) => {}
                    _ = self.shutdown_rx.changed() => {}
                }
            }
        }
        info!(worker = self.id, "Pipeline worker stopped");
    }

    /// Polls both topics once. Returns whether anything was processed.
    async fn poll_once(&self, lease: Duration) -> bool {
        match self.queue.receive(TOPIC_APPROVALS, lease).await {
            Ok(Some(message)) => {
                self.process_approval(message).await;
                return true;
            }
            Ok(None) => {}
            Err(e) => warn!(worker = self.id, "Approval receive failed: {}", e),
        }

        match self.queue.receive(TOPIC_EVENTS, lease).await {
            Ok(Some(message)) => {
                self.process_event(message).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(worker = self.id, "Event receive failed: {}", e);
                false
            }
        }
    }

    async fn process_event(&self, message: QueueMessage) {
        let event = match self.normalizer.normalize(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, "Malformed event, dead-lettering: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_event_dead_lettered("malformed");
                }
                if let Err(dl) = self
                    .queue
                    .dead_letter(TOPIC_EVENTS, &message.id, &e.to_string())
                    .await
                {
                    warn!(message_id = %message.id, "Dead-letter failed: {}", dl);
                }
                return;
            }
        };

        let assessment = self.scorer.score(&event).await;
        debug!(
            event_id = %event.event_id,
            score = assessment.score,
            degraded = assessment.degraded,
            "Scored event"
        );

        match self.orchestrator.handle_assessment(&event, &assessment).await {
            Ok(outcome) => {
                debug!(event_id = %event.event_id, ?outcome, "Assessment handled");
                self.acknowledge(TOPIC_EVENTS, &message).await;
            }
            Err(OrchestratorError::Store(StoreError::Unavailable(e))) => {
                // Leave unacknowledged; the lease expires and the queue
                // redelivers.
                error!(event_id = %event.event_id, "Store unavailable, relying on redelivery: {}", e);
            }
            Err(e) => {
                error!(event_id = %event.event_id, "Orchestration failed, relying on redelivery: {}", e);
            }
        }
    }

    async fn process_approval(&self, message: QueueMessage) {
        let signal: ApprovalSignal = match message.deserialize() {
            Ok(signal) => signal,
            Err(e) => {
                warn!(message_id = %message.id, "Malformed approval, dead-lettering: {}", e);
                if let Err(dl) = self
                    .queue
                    .dead_letter(TOPIC_APPROVALS, &message.id, &e.to_string())
                    .await
                {
                    warn!(message_id = %message.id, "Dead-letter failed: {}", dl);
                }
                return;
            }
        };

        match self
            .orchestrator
            .handle_approval(signal.incident_id, &signal.approver)
            .await
        {
            Ok(outcome) => {
                debug!(incident_id = %signal.incident_id, ?outcome, "Approval handled");
                self.acknowledge(TOPIC_APPROVALS, &message).await;
            }
            Err(OrchestratorError::IncidentNotFound(_))
                if message.delivery_count < MAX_APPROVAL_DELIVERIES =>
            {
                // The approval may have raced ahead of its incident; let
                // the lease expire and try again.
                debug!(incident_id = %signal.incident_id, "Approval for unknown incident, awaiting redelivery");
            }
            Err(OrchestratorError::IncidentNotFound(_)) => {
                warn!(incident_id = %signal.incident_id, "Approval never matched an incident, dead-lettering");
                if let Err(dl) = self
                    .queue
                    .dead_letter(TOPIC_APPROVALS, &message.id, "unknown incident")
                    .await
                {
                    warn!(message_id = %message.id, "Dead-letter failed: {}", dl);
                }
            }
            Err(e) => {
                error!(incident_id = %signal.incident_id, "Approval handling failed, relying on redelivery: {}", e);
            }
        }
    }

    async fn acknowledge(&self, topic: &str, message: &QueueMessage) {
        if let Err(e) = self.queue.acknowledge(topic, &message.id).await {
            // The lease may have expired mid-processing and another worker
            // claimed the message; idempotent handling makes that safe.
            warn!(message_id = %message.id, "Acknowledge failed: {}", e);
        }
    }
}

/// A pool of pipeline workers with cooperative shutdown.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
    drain_deadline: Duration,
}

impl WorkerPool {
    /// Starts `config.worker_count` workers.
    ///
    /// The configuration must already be validated
    /// ([`PipelineConfig::validate`]).
    pub fn start(
        queue: Arc<dyn EventQueue>,
        normalizer: Arc<EventNormalizer>,
        scorer: Arc<RiskScorer>,
        orchestrator: Arc<PlaybookOrchestrator>,
        config: PipelineConfig,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
        let drain_deadline = Duration::from_secs(config.drain_deadline_secs);

        let mut workers = JoinSet::new();
        for id in 0..config.worker_count {
            let worker = PipelineWorker {
                id,
                queue: Arc::clone(&queue),
                normalizer: Arc::clone(&normalizer),
                scorer: Arc::clone(&scorer),
                orchestrator: Arc::clone(&orchestrator),
                config: config.clone(),
                metrics: metrics.clone(),
                semaphore: Arc::clone(&semaphore),
                shutdown_rx: shutdown_rx.clone(),
            };
            workers.spawn(worker.run());
        }

        Self {
            shutdown_tx,
            workers,
            drain_deadline,
        }
    }

    /// Signals shutdown and waits for workers to drain.
    ///
    /// Workers finish their in-flight message within the drain deadline;
    /// past it they are aborted and any unacknowledged message is left to
    /// queue redelivery.
    pub async fn shutdown(mut self) {
        info!("Shutting down worker pool");
        let _ = self.shutdown_tx.send(true);

        let drained = tokio::time::timeout(self.drain_deadline, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("Drain deadline exceeded, aborting remaining workers; unacked messages will redeliver");
            self.workers.abort_all();
            while self.workers.join_next().await.is_some() {}
        }
        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::{ActionExecutor, ExecutionResult, IdempotencyKey, PlaybookKind};
    use crate::providers::{MockBaselineProvider, MockThreatIntelProvider};
    use crate::queue::MockEventQueue;
    use crate::store::{IncidentStore, MemoryIncidentStore};
    use async_trait::async_trait;

    struct AlwaysSucceedExecutor;

    #[async_trait]
    impl ActionExecutor for AlwaysSucceedExecutor {
        async fn execute(
            &self,
            _playbook: PlaybookKind,
            _key: IdempotencyKey,
            _params: &serde_json::Value,
        ) -> ExecutionResult {
            ExecutionResult::success("ok", vec![])
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            worker_count: 2,
            max_in_flight: 4,
            backoff_base_ms: 1,
            receive_idle_ms: 10,
            drain_deadline_secs: 2,
            ..PipelineConfig::default()
        }
    }

    fn high_risk_payload() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "eventName": "CreateAccessKey",
            "eventTime": "2025-06-01T12:00:00Z",
            "sourceIPAddress": "45.142.120.10",
            "awsRegion": "ap-southeast-1",
            "userIdentity": {"userName": "alice@example.com"}
        }))
        .unwrap()
    }

    fn build_pool(
        queue: Arc<MockEventQueue>,
        store: Arc<MemoryIncidentStore>,
    ) -> WorkerPool {
        let config = test_config();
        let scorer = RiskScorer::new(
            Arc::new(MockBaselineProvider::with_sample_profiles()),
            Arc::new(MockThreatIntelProvider::with_known_bad()),
        );
        let orchestrator = PlaybookOrchestrator::new(
            Arc::clone(&store) as Arc<dyn IncidentStore>,
            Arc::new(AlwaysSucceedExecutor),
            config.clone(),
        );
        WorkerPool::start(
            queue,
            Arc::new(EventNormalizer::new()),
            Arc::new(scorer),
            Arc::new(orchestrator),
            config,
            None,
        )
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_event_flows_to_completed_incident() {
        let queue = Arc::new(MockEventQueue::new());
        let store = Arc::new(MemoryIncidentStore::new());
        queue.publish(TOPIC_EVENTS, &high_risk_payload()).await.unwrap();

        let pool = build_pool(Arc::clone(&queue), Arc::clone(&store));

        let snapshot_store = Arc::clone(&store);
        wait_until(|| {
            let store = Arc::clone(&snapshot_store);
            async move {
                store
                    .snapshot()
                    .await
                    .map(|incidents| {
                        incidents.len() == 1
                            && incidents[0].state == crate::incident::IncidentState::Completed
                    })
                    .unwrap_or(false)
            }
        })
        .await;

        // Message acknowledged: nothing left on the topic.
        assert_eq!(queue.remaining(TOPIC_EVENTS).await, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_event_is_dead_lettered() {
        let queue = Arc::new(MockEventQueue::new());
        let store = Arc::new(MemoryIncidentStore::new());
        queue
            .publish(TOPIC_EVENTS, b"{\"eventName\": \"X\"}")
            .await
            .unwrap();

        let pool = build_pool(Arc::clone(&queue), Arc::clone(&store));

        let dl_queue = Arc::clone(&queue);
        wait_until(|| {
            let queue = Arc::clone(&dl_queue);
            async move { !queue.dead_letters(TOPIC_EVENTS).await.is_empty() }
        })
        .await;

        assert_eq!(queue.remaining(TOPIC_EVENTS).await, 0);
        assert!(store.snapshot().await.unwrap().is_empty());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_approval_is_dead_lettered() {
        let queue = Arc::new(MockEventQueue::new());
        let store = Arc::new(MemoryIncidentStore::new());
        queue
            .publish(TOPIC_APPROVALS, b"not an approval")
            .await
            .unwrap();

        let pool = build_pool(Arc::clone(&queue), Arc::clone(&store));

        let dl_queue = Arc::clone(&queue);
        wait_until(|| {
            let queue = Arc::clone(&dl_queue);
            async move { !queue.dead_letters(TOPIC_APPROVALS).await.is_empty() }
        })
        .await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt_when_idle() {
        let queue = Arc::new(MockEventQueue::new());
        let store = Arc::new(MemoryIncidentStore::new());
        let pool = build_pool(queue, store);

        let started = std::time::Instant::now();
        pool.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
