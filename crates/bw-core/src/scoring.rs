//! Multi-signal risk scoring.
//!
//! The scorer combines four independent signals into a 0-100 score:
//! privileged action, threat-intel reputation, behavioral anomaly, and
//! anomalous geolocation. Each signal is additive and idempotent; the
//! result is bit-for-bit reproducible given identical collaborator
//! responses. Collaborator failures degrade the assessment instead of
//! failing it.

use crate::event::SecurityEvent;
use crate::providers::{BaselineProvider, LookupError, ThreatIntelProvider};
use bw_observability::PipelineMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Default bound on a single collaborator lookup.
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// The signals the scorer evaluates, in application order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// The action is in the privileged-action set.
    PrivilegedAction,
    /// The source IP is known-bad per threat intelligence.
    ThreatIntelHit,
    /// The action is outside the entity's behavioral baseline.
    BehavioralAnomaly,
    /// The source region is outside the entity's known regions.
    GeoAnomaly,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::PrivilegedAction => write!(f, "privileged_action"),
            SignalKind::ThreatIntelHit => write!(f, "threat_intel_hit"),
            SignalKind::BehavioralAnomaly => write!(f, "behavioral_anomaly"),
            SignalKind::GeoAnomaly => write!(f, "geo_anomaly"),
        }
    }
}

/// Configurable weights for each scoring signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    /// Weight for a privileged action (default: 35).
    pub privileged_action: u8,
    /// Weight for a threat-intel reputation hit (default: 25).
    pub threat_intel_hit: u8,
    /// Weight for a behavioral anomaly (default: 25).
    pub behavioral_anomaly: u8,
    /// Weight for anomalous geolocation (default: 15).
    pub geo_anomaly: u8,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            privileged_action: 35,
            threat_intel_hit: 25,
            behavioral_anomaly: 25,
            geo_anomaly: 15,
        }
    }
}

/// Invalid signal-weight configuration.
#[derive(Error, Debug)]
#[error("invalid signal weights: {0}")]
pub struct InvalidWeights(String);

impl SignalWeights {
    /// Returns the weight for a signal.
    pub fn weight_of(&self, signal: SignalKind) -> u8 {
        match signal {
            SignalKind::PrivilegedAction => self.privileged_action,
            SignalKind::ThreatIntelHit => self.threat_intel_hit,
            SignalKind::BehavioralAnomaly => self.behavioral_anomaly,
            SignalKind::GeoAnomaly => self.geo_anomaly,
        }
    }

    /// Validates that no single weight exceeds the score ceiling.
    pub fn validate(&self) -> Result<(), InvalidWeights> {
        for signal in [
            SignalKind::PrivilegedAction,
            SignalKind::ThreatIntelHit,
            SignalKind::BehavioralAnomaly,
            SignalKind::GeoAnomaly,
        ] {
            if self.weight_of(signal) > 100 {
                return Err(InvalidWeights(format!(
                    "weight for {} exceeds 100",
                    signal
                )));
            }
        }
        Ok(())
    }
}

/// A single factor that contributed to a risk score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskFactor {
    /// The signal that fired.
    pub signal: SignalKind,
    /// The weight it contributed.
    pub weight: u8,
}

/// A computed risk assessment for a security event.
///
/// Produced exactly once per event; recomputation from the same event and
/// the same collaborator responses is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// The event this assessment covers.
    pub event_id: Uuid,
    /// The entity under review.
    pub entity_id: String,
    /// Sum of triggered signal weights, clamped to 0-100.
    pub score: u8,
    /// Triggered signals in application order.
    pub factors: Vec<RiskFactor>,
    /// Whether one or more collaborator signals were unavailable.
    pub degraded: bool,
    /// When this assessment was computed.
    pub computed_at: DateTime<Utc>,
}

/// Computes [`RiskAssessment`]s from events and collaborator lookups.
pub struct RiskScorer {
    baseline: Arc<dyn BaselineProvider>,
    threat_intel: Arc<dyn ThreatIntelProvider>,
    weights: SignalWeights,
    privileged_actions: HashSet<String>,
    lookup_timeout: Duration,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl RiskScorer {
    /// Creates a scorer with default weights and the default
    /// privileged-action set.
    pub fn new(
        baseline: Arc<dyn BaselineProvider>,
        threat_intel: Arc<dyn ThreatIntelProvider>,
    ) -> Self {
        Self {
            baseline,
            threat_intel,
            weights: SignalWeights::default(),
            privileged_actions: crate::event::DEFAULT_PRIVILEGED_ACTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            metrics: None,
        }
    }

    /// Overrides the signal weights.
    pub fn with_weights(mut self, weights: SignalWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Overrides the privileged-action set.
    pub fn with_privileged_actions(mut self, actions: HashSet<String>) -> Self {
        self.privileged_actions = actions;
        self
    }

    /// Attaches a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Overrides the per-lookup timeout bound.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Scores an event.
    ///
    /// Never fails: an unavailable or slow collaborator contributes no
    /// signal and marks the assessment degraded. Each lookup is bounded by
    /// the configured timeout so the pipeline never blocks indefinitely.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn score(&self, event: &SecurityEvent) -> RiskAssessment {
        let started = std::time::Instant::now();
        let mut factors = Vec::new();
        let mut degraded = false;

        if self.privileged_actions.contains(&event.event_name) {
            factors.push(RiskFactor {
                signal: SignalKind::PrivilegedAction,
                weight: self.weights.privileged_action,
            });
        }

        match self.bounded(self.threat_intel.lookup(&event.source_ip)).await {
            Ok(reputation) => {
                if reputation.is_malicious() {
                    factors.push(RiskFactor {
                        signal: SignalKind::ThreatIntelHit,
                        weight: self.weights.threat_intel_hit,
                    });
                }
            }
            Err(e) => {
                warn!(source_ip = %event.source_ip, "Threat intel lookup failed: {}", e);
                degraded = true;
            }
        }

        match self.bounded(self.baseline.normal_actions(event.entity_id())).await {
            Ok(normal) => {
                // An entity without a profile yet is not anomalous.
                if !normal.is_empty() && !normal.contains(&event.event_name) {
                    factors.push(RiskFactor {
                        signal: SignalKind::BehavioralAnomaly,
                        weight: self.weights.behavioral_anomaly,
                    });
                }
            }
            Err(e) => {
                warn!(entity_id = %event.entity_id(), "Baseline action lookup failed: {}", e);
                degraded = true;
            }
        }

        match self.bounded(self.baseline.known_regions(event.entity_id())).await {
            Ok(known) => {
                let in_known = event
                    .source_region
                    .as_ref()
                    .map(|region| known.contains(region))
                    .unwrap_or(false);
                if !known.is_empty() && !in_known {
                    factors.push(RiskFactor {
                        signal: SignalKind::GeoAnomaly,
                        weight: self.weights.geo_anomaly,
                    });
                }
            }
            Err(e) => {
                warn!(entity_id = %event.entity_id(), "Baseline region lookup failed: {}", e);
                degraded = true;
            }
        }

        let total: u16 = factors.iter().map(|f| f.weight as u16).sum();
        let score = total.min(100) as u8;

        if let Some(metrics) = &self.metrics {
            metrics.record_assessment(degraded, started.elapsed().as_secs_f64());
        }

        RiskAssessment {
            event_id: event.event_id,
            entity_id: event.entity_id().to_string(),
            score,
            factors,
            degraded,
            computed_at: Utc::now(),
        }
    }

    /// Bounds a collaborator lookup by the configured timeout.
    async fn bounded<T>(
        &self,
        lookup: impl std::future::Future<Output = Result<T, LookupError>>,
    ) -> Result<T, LookupError> {
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::new("lookup timed out")),
        }
    }
}
