//! End-to-end tests wiring the real playbook executor into the pipeline.

use bw_actions::PlaybookActionExecutor;
use bw_core::event::EventNormalizer;
use bw_core::incident::IncidentState;
use bw_core::orchestrator::PlaybookOrchestrator;
use bw_core::playbook::PlaybookKind;
use bw_core::providers::{MockBaselineProvider, MockThreatIntelProvider};
use bw_core::queue::{EventQueue, MockEventQueue, TOPIC_APPROVALS, TOPIC_EVENTS};
use bw_core::scoring::RiskScorer;
use bw_core::store::{IncidentStore, MemoryIncidentStore};
use bw_core::worker::{ApprovalSignal, WorkerPool};
use bw_core::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;

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

fn pipeline(queue: Arc<MockEventQueue>, store: Arc<MemoryIncidentStore>) -> WorkerPool {
    let config = test_config();
    config.validate().expect("test config must be valid");
    let scorer = RiskScorer::new(
        Arc::new(MockBaselineProvider::with_sample_profiles()),
        Arc::new(MockThreatIntelProvider::with_known_bad()),
    );
    let orchestrator = PlaybookOrchestrator::new(
        Arc::clone(&store) as Arc<dyn IncidentStore>,
        Arc::new(PlaybookActionExecutor::new()),
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

fn payload(event_name: &str, actor: &str, source_ip: &str, region: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "eventName": event_name,
        "eventTime": "2025-06-01T12:00:00Z",
        "sourceIPAddress": source_ip,
        "awsRegion": region,
        "userIdentity": {"userName": actor}
    }))
    .unwrap()
}

async fn wait_for_state(
    store: &MemoryIncidentStore,
    state: IncidentState,
) -> bw_core::incident::Incident {
    for _ in 0..200 {
        if let Ok(incidents) = store.snapshot().await {
            if let Some(incident) = incidents.iter().find(|i| i.state == state) {
                return incident.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no incident reached {:?} in time", state);
}

#[tokio::test]
async fn identity_compromise_runs_user_lockdown() {
    let queue = Arc::new(MockEventQueue::new());
    let store = Arc::new(MemoryIncidentStore::new());
    // Privileged + known-bad IP + behavioral + geo anomaly: score 100.
    queue
        .publish(
            TOPIC_EVENTS,
            &payload(
                "CreateAccessKey",
                "alice@example.com",
                "185.220.101.1",
                "ap-southeast-1",
            ),
        )
        .await
        .unwrap();

    let pool = pipeline(Arc::clone(&queue), Arc::clone(&store));

    let incident = wait_for_state(&store, IncidentState::Completed).await;
    assert_eq!(incident.playbook, PlaybookKind::UserLockdown);

    let rows = store.executions(incident.incident_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].playbook, PlaybookKind::UserLockdown);
    pool.shutdown().await;
}

#[tokio::test]
async fn resource_compromise_runs_isolation() {
    let queue = Arc::new(MockEventQueue::new());
    let store = Arc::new(MemoryIncidentStore::new());
    // DeleteBucket is both privileged and resource-classified; from a
    // known-bad IP outside bob's baseline it scores 100.
    queue
        .publish(
            TOPIC_EVENTS,
            &payload(
                "DeleteBucket",
                "bob@example.com",
                "45.142.120.10",
                "eu-west-1",
            ),
        )
        .await
        .unwrap();

    let pool = pipeline(Arc::clone(&queue), Arc::clone(&store));

    let incident = wait_for_state(&store, IncidentState::Completed).await;
    assert_eq!(incident.playbook, PlaybookKind::IsolateResource);
    pool.shutdown().await;
}

#[tokio::test]
async fn low_risk_event_requires_human_approval() {
    let queue = Arc::new(MockEventQueue::new());
    let store = Arc::new(MemoryIncidentStore::new());
    // Privileged only (35): below the 75 threshold.
    queue
        .publish(
            TOPIC_EVENTS,
            &payload(
                "CreateAccessKey",
                "unknown-svc@example.com",
                "203.0.113.45",
                "us-east-1",
            ),
        )
        .await
        .unwrap();

    let pool = pipeline(Arc::clone(&queue), Arc::clone(&store));

    let parked = wait_for_state(&store, IncidentState::ManualReview).await;

    let approval = ApprovalSignal {
        incident_id: parked.incident_id,
        approver: "analyst@example.com".to_string(),
    };
    queue
        .publish(TOPIC_APPROVALS, &serde_json::to_vec(&approval).unwrap())
        .await
        .unwrap();

    let done = wait_for_state(&store, IncidentState::Completed).await;
    let rows = store.executions(done.incident_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].error_detail.is_none());
    pool.shutdown().await;
}
