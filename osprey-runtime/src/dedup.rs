//! Decay-aware dedup engine

use chrono::{DateTime, Utc};
use osprey_core::Artifact;
use std::sync::Arc;
use tracing::debug;

use crate::{history, HistoryStore, StoreError};

/// Decides whether artifacts are new findings for a rule
#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<dyn HistoryStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Read-only novelty check against the latest sighting
    pub fn is_unique(
        &self,
        artifact: &Artifact,
        rule_id: &str,
        lifetime: Option<u64>,
        base_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let latest = self.store.find_latest(&artifact.data, rule_id)?;
        Ok(history::is_unique(latest.as_ref(), lifetime, base_time))
    }

    /// Keep the artifacts that are new, recording a sighting for each
    ///
    /// Check and record happen as one step in the store, so a concurrent run
    /// claiming the same artifact sees it as already seen.
    pub fn claim(
        &self,
        artifacts: Vec<Artifact>,
        rule_id: &str,
        lifetime: Option<u64>,
        base_time: DateTime<Utc>,
    ) -> Result<Vec<Artifact>, StoreError> {
        let total = artifacts.len();
        let mut unique = Vec::with_capacity(total);

        for artifact in artifacts {
            if self
                .store
                .record_if_unique(&artifact.data, rule_id, lifetime, base_time)?
            {
                unique.push(artifact);
            } else {
                debug!("{} already seen under rule {}", artifact.data, rule_id);
            }
        }

        debug!("{}/{} artifacts are new for rule {}", unique.len(), total, rule_id);
        Ok(unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryHistory;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unseen_artifact_is_unique() {
        let engine = DedupEngine::new(Arc::new(MemoryHistory::new()));
        let artifact = Artifact::new("1.2.3.4");
        assert!(engine.is_unique(&artifact, "r1", None, t0()).unwrap());
        assert!(engine.is_unique(&artifact, "r1", Some(10), t0()).unwrap());
    }

    #[test]
    fn test_prior_sighting_decays() {
        let history = Arc::new(MemoryHistory::new());
        history.record("1.2.3.4", "r1", t0());
        let engine = DedupEngine::new(history);
        let artifact = Artifact::new("1.2.3.4");
        let lifetime = Some(3600);

        assert!(engine
            .is_unique(&artifact, "r1", lifetime, t0() + Duration::seconds(3601))
            .unwrap());
        assert!(!engine
            .is_unique(&artifact, "r1", lifetime, t0() + Duration::seconds(3599))
            .unwrap());
        assert!(!engine
            .is_unique(&artifact, "r1", None, t0() + Duration::days(1000))
            .unwrap());
    }

    #[test]
    fn test_claim_is_single_use() {
        let engine = DedupEngine::new(Arc::new(MemoryHistory::new()));
        let batch = || vec![Artifact::new("1.2.3.4"), Artifact::new("evil.example.com")];

        let first = engine.claim(batch(), "r1", Some(3600), t0()).unwrap();
        assert_eq!(first.len(), 2);

        let second = engine
            .claim(batch(), "r1", Some(3600), t0() + Duration::seconds(5))
            .unwrap();
        assert!(second.is_empty());
    }
}
