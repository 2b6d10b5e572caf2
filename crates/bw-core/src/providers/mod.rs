//! External collaborator seams for risk scoring.
//!
//! The scorer consults two read-only collaborators: a per-entity behavioral
//! baseline and a threat-intelligence reputation service. Both are modeled
//! as capability traits so production connectors and deterministic test
//! doubles are interchangeable. Lookups are the pipeline's suspension
//! points and must carry bounded timeouts inside their implementations;
//! a failed lookup degrades the assessment, it never fails the pipeline.

pub mod mock;

pub use mock::{MockBaselineProvider, MockThreatIntelProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A collaborator lookup could not be completed.
///
/// Always recoverable: the caller treats it as "no signal contributed"
/// and flags the assessment as degraded.
#[derive(Error, Debug, Clone)]
#[error("lookup unavailable: {0}")]
pub struct LookupError(pub String);

impl LookupError {
    /// Creates a new lookup error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Reputation verdict for a source IP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpReputation {
    /// Reputation score, 0-100; higher is more suspicious.
    pub reputation: u8,
}

impl IpReputation {
    /// A clean reputation.
    pub fn clean() -> Self {
        Self { reputation: 0 }
    }

    /// Whether the source is considered known-bad.
    ///
    /// The known-bad line sits above the 0-80 band of merely-noisy
    /// infrastructure.
    pub fn is_malicious(&self) -> bool {
        self.reputation > 80
    }
}

/// Per-entity historical profile of normal behavior.
#[async_trait]
pub trait BaselineProvider: Send + Sync + 'static {
    /// Action names the entity routinely performs.
    ///
    /// An empty set means the entity has no profile yet; callers must not
    /// treat first-seen entities as anomalous.
    async fn normal_actions(&self, entity_id: &str) -> Result<HashSet<String>, LookupError>;

    /// Region codes the entity is known to operate from.
    async fn known_regions(&self, entity_id: &str) -> Result<HashSet<String>, LookupError>;
}

/// Threat-intelligence reputation service.
#[async_trait]
pub trait ThreatIntelProvider: Send + Sync + 'static {
    /// Looks up the reputation of a source IP.
    async fn lookup(&self, ip: &str) -> Result<IpReputation, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malicious_threshold() {
        assert!(!IpReputation { reputation: 80 }.is_malicious());
        assert!(IpReputation { reputation: 81 }.is_malicious());
        assert!(IpReputation { reputation: 100 }.is_malicious());
        assert!(!IpReputation::clean().is_malicious());
    }
}
