//! Canonical security event model and the normalization stage.
//!
//! Raw provider payloads (CloudTrail-style JSON) enter the pipeline here.
//! Normalization assigns a content-addressed deduplication identity and a
//! coarse risk tier; everything downstream works with the canonical
//! [`SecurityEvent`] only.

use bw_observability::PipelineMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Actions capable of escalating or persisting attacker access.
///
/// Membership drives both the event risk tier and the privileged-action
/// scoring signal.
pub const DEFAULT_PRIVILEGED_ACTIONS: &[&str] = &[
    "CreateAccessKey",
    "AttachUserPolicy",
    "PutUserPolicy",
    "DeleteTrail",
    "StopLogging",
    "DeleteBucket",
];

/// Errors raised while normalizing a raw provider payload.
///
/// All variants are unrecoverable for the message in hand: the event is
/// routed to the dead-letter path and never retried.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unparseable event timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Coarse risk tier assigned at normalization time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Routine activity.
    Low,
    /// Privileged identity/access activity.
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// A normalized security event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Content-addressed deduplication key. Re-delivery of the same raw
    /// payload always yields the same id.
    pub event_id: Uuid,
    /// Provider action identifier (e.g. "CreateAccessKey").
    pub event_name: String,
    /// The identity that performed the action.
    pub actor_identity: String,
    /// Source IP address of the call.
    pub source_ip: String,
    /// Source region, when the provider reports one.
    pub source_region: Option<String>,
    /// When the provider recorded the event.
    pub timestamp: DateTime<Utc>,
    /// The original payload, kept opaque for audit.
    pub raw_payload: serde_json::Value,
    /// Coarse tier from privileged-action classification.
    pub risk_tier: RiskTier,
}

impl SecurityEvent {
    /// The entity under review for this event.
    pub fn entity_id(&self) -> &str {
        &self.actor_identity
    }
}

/// Parses raw provider payloads into canonical [`SecurityEvent`]s.
pub struct EventNormalizer {
    privileged_actions: HashSet<String>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl EventNormalizer {
    /// Creates a normalizer with the default privileged-action set.
    pub fn new() -> Self {
        Self::with_privileged_actions(
            DEFAULT_PRIVILEGED_ACTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Creates a normalizer with a custom privileged-action set.
    pub fn with_privileged_actions(privileged_actions: HashSet<String>) -> Self {
        Self {
            privileged_actions,
            metrics: None,
        }
    }

    /// Attaches a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the configured privileged-action set.
    pub fn privileged_actions(&self) -> &HashSet<String> {
        &self.privileged_actions
    }

    /// Normalizes a raw payload into a [`SecurityEvent`].
    ///
    /// The payload may be a bare provider record or wrapped in a `detail`
    /// envelope. Required fields: event name, actor identity, timestamp,
    /// source IP. Missing or unparseable required fields fail with
    /// [`NormalizeError`]; unknown action names never do.
    pub fn normalize(&self, raw: &[u8]) -> Result<SecurityEvent, NormalizeError> {
        let payload: serde_json::Value = serde_json::from_slice(raw)?;
        let detail = payload.get("detail").unwrap_or(&payload);

        let event_name = detail
            .get("eventName")
            .and_then(|v| v.as_str())
            .ok_or(NormalizeError::MissingField("eventName"))?
            .to_string();

        let identity = detail
            .get("userIdentity")
            .ok_or(NormalizeError::MissingField("userIdentity"))?;
        let actor_identity = identity
            .get("userName")
            .or_else(|| identity.get("principalId"))
            .and_then(|v| v.as_str())
            .ok_or(NormalizeError::MissingField("userIdentity.userName"))?
            .to_string();

        let raw_ts = detail
            .get("eventTime")
            .and_then(|v| v.as_str())
            .ok_or(NormalizeError::MissingField("eventTime"))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_ts)
            .map_err(|_| NormalizeError::InvalidTimestamp(raw_ts.to_string()))?
            .with_timezone(&Utc);

        let source_ip = detail
            .get("sourceIPAddress")
            .and_then(|v| v.as_str())
            .ok_or(NormalizeError::MissingField("sourceIPAddress"))?
            .to_string();

        let source_region = detail
            .get("awsRegion")
            .and_then(|v| v.as_str())
            .map(String::from);

        let risk_tier = if self.privileged_actions.contains(&event_name) {
            RiskTier::High
        } else {
            RiskTier::Low
        };

        let event = SecurityEvent {
            event_id: dedup_key(raw),
            event_name,
            actor_identity,
            source_ip,
            source_region,
            timestamp,
            raw_payload: payload,
            risk_tier,
        };

        debug!(
            event_id = %event.event_id,
            event_name = %event.event_name,
            tier = %event.risk_tier,
            "Normalized event"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_event_normalized(&event.risk_tier.to_string());
        }

        Ok(event)
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the content-addressed event identity.
///
/// SHA-256 over the raw payload bytes, truncated to 128 bits. Identical
/// payloads (including the provider-assigned id and timestamp) always map
/// to the same key, so redundant delivery is a no-op downstream.
fn dedup_key(raw: &[u8]) -> Uuid {
    let digest = Sha256::digest(raw);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
