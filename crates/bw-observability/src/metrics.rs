//! Metrics collection for the decisioning pipeline.
//!
//! This module provides metrics collection using the metrics crate.
//! Components hold an `Arc<PipelineMetrics>` and record through it; the
//! collector owns no mutable state of its own.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Severity buckets for unresolved-incident gauges, derived from risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityBucket {
    Low,
    Medium,
    High,
}

impl SeverityBucket {
    /// Buckets a 0-100 risk score.
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 75 => Self::High,
            s if s >= 40 => Self::Medium,
            _ => Self::Low,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Metrics collector for the decisioning pipeline.
///
/// One instance per process, shared via `Arc`. All metric names carry the
/// `bw_` prefix.
pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Creates a new metrics collector and registers metric descriptions.
    pub fn new() -> Self {
        Self::register_metrics();
        Self
    }

    fn register_metrics() {
        describe_counter!(
            "bw_events_total",
            "Total security events normalized, by risk tier"
        );
        describe_counter!(
            "bw_events_dead_lettered_total",
            "Total malformed events routed to the dead-letter path"
        );
        describe_counter!("bw_assessments_total", "Total risk assessments computed");
        describe_counter!(
            "bw_degraded_assessments_total",
            "Assessments computed with one or more collaborator signals unavailable"
        );
        describe_counter!(
            "bw_actions_total",
            "Playbook action attempts, by playbook and status"
        );
        describe_counter!(
            "bw_incidents_total",
            "Incidents reaching a state, by state"
        );
        describe_counter!(
            "bw_state_conflicts_total",
            "Store transitions dropped because another worker advanced the incident"
        );

        describe_gauge!(
            "bw_unresolved_incidents",
            "Incidents not yet in a terminal state, by severity"
        );

        describe_histogram!("bw_scoring_duration_seconds", "Risk scoring latency");
        describe_histogram!(
            "bw_playbook_duration_seconds",
            "Playbook execution latency, by playbook"
        );
    }

    /// Records a normalized event, tagged by risk tier.
    pub fn record_event_normalized(&self, tier: &str) {
        counter!("bw_events_total", "tier" => tier.to_string()).increment(1);
    }

    /// Records an event routed to the dead-letter path.
    pub fn record_event_dead_lettered(&self, reason: &str) {
        counter!("bw_events_dead_lettered_total", "reason" => reason.to_string()).increment(1);
    }

    /// Records a computed risk assessment.
    pub fn record_assessment(&self, degraded: bool, duration_secs: f64) {
        counter!("bw_assessments_total").increment(1);
        if degraded {
            counter!("bw_degraded_assessments_total").increment(1);
        }
        histogram!("bw_scoring_duration_seconds").record(duration_secs);
    }

    /// Records a playbook action attempt.
    pub fn record_action(&self, playbook: &str, status: &str) {
        counter!("bw_actions_total", "playbook" => playbook.to_string(), "status" => status.to_string())
            .increment(1);
    }

    /// Records playbook execution duration.
    pub fn record_playbook_duration(&self, playbook: &str, duration_secs: f64) {
        histogram!("bw_playbook_duration_seconds", "playbook" => playbook.to_string())
            .record(duration_secs);
    }

    /// Records an incident entering a state.
    pub fn record_incident_state(&self, state: &str) {
        counter!("bw_incidents_total", "state" => state.to_string()).increment(1);
    }

    /// Records a dropped transition attempt (another worker won the CAS).
    pub fn record_state_conflict(&self) {
        counter!("bw_state_conflicts_total").increment(1);
    }

    /// Records a newly opened (unresolved) incident.
    pub fn record_incident_opened(&self, score: u8) {
        let severity = SeverityBucket::from_score(score);
        gauge!("bw_unresolved_incidents", "severity" => severity.as_str()).increment(1.0);
    }

    /// Records an incident reaching a terminal state.
    pub fn record_incident_closed(&self, score: u8) {
        let severity = SeverityBucket::from_score(score);
        gauge!("bw_unresolved_incidents", "severity" => severity.as_str()).decrement(1.0);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_buckets() {
        assert_eq!(SeverityBucket::from_score(0), SeverityBucket::Low);
        assert_eq!(SeverityBucket::from_score(39), SeverityBucket::Low);
        assert_eq!(SeverityBucket::from_score(40), SeverityBucket::Medium);
        assert_eq!(SeverityBucket::from_score(74), SeverityBucket::Medium);
        assert_eq!(SeverityBucket::from_score(75), SeverityBucket::High);
        assert_eq!(SeverityBucket::from_score(100), SeverityBucket::High);
    }

    #[test]
    fn test_recording_does_not_panic_without_recorder() {
        // The metrics crate no-ops when no recorder is installed.
        let metrics = PipelineMetrics::new();
        metrics.record_event_normalized("high");
        metrics.record_event_dead_lettered("malformed");
        metrics.record_assessment(true, 0.001);
        metrics.record_action("user_lockdown", "succeeded");
        metrics.record_playbook_duration("user_lockdown", 0.2);
        metrics.record_incident_state("completed");
        metrics.record_state_conflict();
        metrics.record_incident_opened(80);
        metrics.record_incident_closed(80);
    }
}
