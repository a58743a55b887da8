//! Dedup history
//!
//! Prior sightings keyed by `(data, rule_id)`. Stores serialize the
//! check-and-record step so two concurrent runs cannot both claim the same
//! artifact as new.

use chrono::{DateTime, Duration, Utc};
use osprey_core::{Alert, Rule};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use crate::{RuleStore, StoredRule};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// One prior sighting of an artifact under a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub data: String,
    pub rule_id: String,
    pub created_at: DateTime<Utc>,
}

/// Whether a prior sighting still suppresses a new alert
///
/// No sighting means unique. Without a lifetime a sighting suppresses
/// forever. With one, the sighting must be strictly older than
/// `base_time - lifetime`; a sighting exactly on the boundary still suppresses.
pub fn is_unique(latest: Option<&Sighting>, lifetime: Option<u64>, base_time: DateTime<Utc>) -> bool {
    let Some(latest) = latest else {
        return true;
    };
    let Some(lifetime) = lifetime else {
        return false;
    };
    let window = Duration::try_seconds(i64::try_from(lifetime).unwrap_or(i64::MAX))
        .unwrap_or(Duration::MAX);
    match base_time.checked_sub_signed(window) {
        Some(decayed_at) => latest.created_at < decayed_at,
        None => false,
    }
}

/// Persisted history of sightings and alerts
pub trait HistoryStore: Send + Sync {
    /// Most recent sighting of `data` under `rule_id`
    fn find_latest(&self, data: &str, rule_id: &str) -> Result<Option<Sighting>, StoreError>;

    /// Atomically check uniqueness and, if unique, record a sighting at `base_time`
    fn record_if_unique(
        &self,
        data: &str,
        rule_id: &str,
        lifetime: Option<u64>,
        base_time: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Store an alert with its enriched artifacts
    ///
    /// Sightings are recorded by [`HistoryStore::record_if_unique`], not here.
    fn persist(&self, alert: &Alert) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryState {
    sightings: HashMap<(String, String), DateTime<Utc>>,
    alerts: Vec<Alert>,
    rules: HashMap<String, StoredRule>,
}

/// History kept in process memory
#[derive(Default)]
pub struct MemoryHistory {
    state: Mutex<MemoryState>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.clone()
    }

    /// Insert a sighting directly, e.g. to seed history
    pub fn record(&self, data: &str, rule_id: &str, created_at: DateTime<Utc>) {
        let mut state = self.state.lock();
        let entry = state
            .sightings
            .entry((data.to_string(), rule_id.to_string()))
            .or_insert(created_at);
        if created_at > *entry {
            *entry = created_at;
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn find_latest(&self, data: &str, rule_id: &str) -> Result<Option<Sighting>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .sightings
            .get(&(data.to_string(), rule_id.to_string()))
            .map(|created_at| Sighting {
                data: data.to_string(),
                rule_id: rule_id.to_string(),
                created_at: *created_at,
            }))
    }

    fn record_if_unique(
        &self,
        data: &str,
        rule_id: &str,
        lifetime: Option<u64>,
        base_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let key = (data.to_string(), rule_id.to_string());
        let latest = state.sightings.get(&key).map(|created_at| Sighting {
            data: data.to_string(),
            rule_id: rule_id.to_string(),
            created_at: *created_at,
        });

        if !is_unique(latest.as_ref(), lifetime, base_time) {
            return Ok(false);
        }
        state.sightings.insert(key, base_time);
        Ok(true)
    }

    fn persist(&self, alert: &Alert) -> Result<(), StoreError> {
        self.state.lock().alerts.push(alert.clone());
        Ok(())
    }
}

impl RuleStore for MemoryHistory {
    fn find_rule(&self, id: &str) -> Result<Option<StoredRule>, StoreError> {
        Ok(self.state.lock().rules.get(id).cloned())
    }

    fn save_rule(&self, rule: &Rule, body: &str, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        let stored = StoredRule {
            rule: rule.clone(),
            body: body.to_string(),
            updated_at,
        };
        self.state.lock().rules.insert(rule.id.clone(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sighting(at: DateTime<Utc>) -> Sighting {
        Sighting {
            data: "1.2.3.4".to_string(),
            rule_id: "r1".to_string(),
            created_at: at,
        }
    }

    #[test]
    fn test_no_sighting_is_unique() {
        assert!(is_unique(None, None, t0()));
        assert!(is_unique(None, Some(60), t0()));
    }

    #[test]
    fn test_no_lifetime_never_decays() {
        let seen = sighting(t0());
        assert!(!is_unique(Some(&seen), None, t0() + Duration::days(3650)));
    }

    #[test]
    fn test_decay_window() {
        let seen = sighting(t0());
        let lifetime = 3600;
        let l = Duration::seconds(lifetime as i64);

        assert!(is_unique(Some(&seen), Some(lifetime), t0() + l + Duration::seconds(1)));
        assert!(!is_unique(Some(&seen), Some(lifetime), t0() + l - Duration::seconds(1)));
        // Boundary instant is exclusive
        assert!(!is_unique(Some(&seen), Some(lifetime), t0() + l));
    }

    #[test]
    fn test_memory_record_if_unique() {
        let history = MemoryHistory::new();
        assert!(history.record_if_unique("1.2.3.4", "r1", Some(3600), t0()).unwrap());
        assert!(!history.record_if_unique("1.2.3.4", "r1", Some(3600), t0()).unwrap());
        // Other rules keep their own history
        assert!(history.record_if_unique("1.2.3.4", "r2", Some(3600), t0()).unwrap());

        let later = t0() + Duration::seconds(3601);
        assert!(history.record_if_unique("1.2.3.4", "r1", Some(3600), later).unwrap());
        assert_eq!(
            history.find_latest("1.2.3.4", "r1").unwrap().unwrap().created_at,
            later
        );
    }

    #[test]
    fn test_record_keeps_latest() {
        let history = MemoryHistory::new();
        history.record("evil.example.com", "r1", t0());
        history.record("evil.example.com", "r1", t0() - Duration::hours(1));
        assert_eq!(
            history.find_latest("evil.example.com", "r1").unwrap().unwrap().created_at,
            t0()
        );
        assert!(history.find_latest("evil.example.com", "r2").unwrap().is_none());
    }
}
