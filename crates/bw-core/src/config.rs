//! Pipeline configuration.
//!
//! Tunables arrive from the environment at the binary edge; here they are
//! plain data validated once at startup. Invalid values are a hard error,
//! not a clamp.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid pipeline configuration.
#[derive(Error, Debug)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Configuration for the decisioning pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum risk score at which a playbook executes without human
    /// sign-off (default: 75).
    pub auto_approval_threshold: u8,
    /// Maximum playbook attempts before escalation (default: 3).
    pub max_retries: u32,
    /// Base delay for exponential retry backoff, in milliseconds
    /// (default: 250). Doubles per attempt; no jitter.
    pub backoff_base_ms: u64,
    /// Number of pipeline workers (default: 4).
    pub worker_count: usize,
    /// Cap on events processed concurrently across all workers
    /// (default: 16).
    pub max_in_flight: usize,
    /// Queue visibility lease, in seconds (default: 30).
    pub lease_secs: u64,
    /// Bound on a single playbook execution attempt, in seconds
    /// (default: 60).
    pub action_timeout_secs: u64,
    /// How long shutdown waits for in-flight work, in seconds
    /// (default: 10).
    pub drain_deadline_secs: u64,
    /// Idle sleep between empty queue polls, in milliseconds
    /// (default: 100).
    pub receive_idle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_approval_threshold: 75,
            max_retries: 3,
            backoff_base_ms: 250,
            worker_count: 4,
            max_in_flight: 16,
            lease_secs: 30,
            action_timeout_secs: 60,
            drain_deadline_secs: 10,
            receive_idle_ms: 100,
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration. Call once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auto_approval_threshold > 100 {
            return Err(ConfigError(format!(
                "auto_approval_threshold must be <= 100, got {}",
                self.auto_approval_threshold
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError("max_retries must be at least 1".to_string()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError("worker_count must be at least 1".to_string()));
        }
        if self.max_in_flight < self.worker_count {
            return Err(ConfigError(format!(
                "max_in_flight ({}) must be >= worker_count ({})",
                self.max_in_flight, self.worker_count
            )));
        }
        if self.lease_secs == 0 {
            return Err(ConfigError("lease_secs must be at least 1".to_string()));
        }
        if self.action_timeout_secs == 0 {
            return Err(ConfigError(
                "action_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
