//! Deterministic in-memory collaborators for tests and local runs.

use super::{BaselineProvider, IpReputation, LookupError, ThreatIntelProvider};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory baseline provider seeded with a small entity population.
pub struct MockBaselineProvider {
    normal_actions: HashMap<String, HashSet<String>>,
    known_regions: HashMap<String, HashSet<String>>,
    unavailable: AtomicBool,
}

impl MockBaselineProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self {
            normal_actions: HashMap::new(),
            known_regions: HashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Creates a provider seeded with representative entity profiles.
    pub fn with_sample_profiles() -> Self {
        let mut provider = Self::new();
        provider.add_profile(
            "alice@example.com",
            &["GetObject", "PutObject", "DescribeInstances"],
            &["us-east-1", "us-west-2"],
        );
        provider.add_profile("bob@example.com", &["ListBuckets", "GetUser"], &["us-east-1"]);
        provider.add_profile(
            "admin@example.com",
            &["AssumeRole", "GetCallerIdentity"],
            &["us-east-1", "eu-west-1"],
        );
        provider
    }

    /// Adds or replaces a profile for an entity.
    pub fn add_profile(&mut self, entity_id: &str, actions: &[&str], regions: &[&str]) {
        self.normal_actions.insert(
            entity_id.to_string(),
            actions.iter().map(|s| s.to_string()).collect(),
        );
        self.known_regions.insert(
            entity_id.to_string(),
            regions.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Makes all lookups fail with [`LookupError`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LookupError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LookupError::new("baseline provider unavailable"))
        } else {
            Ok(())
        }
    }
}

impl Default for MockBaselineProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaselineProvider for MockBaselineProvider {
    async fn normal_actions(&self, entity_id: &str) -> Result<HashSet<String>, LookupError> {
        self.check_available()?;
        Ok(self
            .normal_actions
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn known_regions(&self, entity_id: &str) -> Result<HashSet<String>, LookupError> {
        self.check_available()?;
        Ok(self
            .known_regions
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory threat-intel provider seeded with known-bad infrastructure.
pub struct MockThreatIntelProvider {
    reputations: HashMap<String, u8>,
    unavailable: AtomicBool,
}

impl MockThreatIntelProvider {
    /// Creates an empty provider; every lookup reports a clean reputation.
    pub fn new() -> Self {
        Self {
            reputations: HashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Creates a provider seeded with a couple of known-bad exit nodes.
    pub fn with_known_bad() -> Self {
        let mut provider = Self::new();
        provider.add_reputation("185.220.101.1", 95); // Tor exit node
        provider.add_reputation("45.142.120.10", 98);
        provider
    }

    /// Records a reputation score for an IP.
    pub fn add_reputation(&mut self, ip: &str, reputation: u8) {
        self.reputations.insert(ip.to_string(), reputation);
    }

    /// Makes all lookups fail with [`LookupError`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Default for MockThreatIntelProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreatIntelProvider for MockThreatIntelProvider {
    async fn lookup(&self, ip: &str) -> Result<IpReputation, LookupError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::new("threat intel provider unavailable"));
        }
        Ok(IpReputation {
            reputation: self.reputations.get(ip).copied().unwrap_or(0),
        })
    }
}
