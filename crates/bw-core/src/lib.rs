//! # bw-core
//!
//! Core decisioning pipeline for Breakwater.
//!
//! This crate provides the event normalizer, the multi-signal risk
//! scorer, the playbook orchestrator state machine, the incident store,
//! and the queue-driven worker pool that ties them together:
//! queue -> normalize -> score -> decide -> act, with an auditable
//! incident record for every event.

pub mod config;
pub mod event;
pub mod incident;
pub mod orchestrator;
pub mod playbook;
pub mod providers;
pub mod queue;
pub mod scoring;
pub mod store;
pub mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use event::{EventNormalizer, NormalizeError, RiskTier, SecurityEvent};
pub use incident::{
    ApprovalMode, ExecutionStatus, Incident, IncidentState, PlaybookExecution,
};
pub use orchestrator::{OrchestratorError, Outcome, PlaybookOrchestrator};
pub use playbook::{
    ActionExecutor, ExecutionResult, IdempotencyKey, PlaybookKind,
};
pub use providers::{
    BaselineProvider, IpReputation, LookupError, MockBaselineProvider, MockThreatIntelProvider,
    ThreatIntelProvider,
};
pub use queue::{EventQueue, MessageId, MockEventQueue, QueueError, QueueHealth, QueueMessage};
pub use scoring::{RiskAssessment, RiskFactor, RiskScorer, SignalKind, SignalWeights};
pub use store::{IncidentStore, MemoryIncidentStore, StoreError};
pub use worker::{ApprovalSignal, WorkerPool};
