//! Alerts: the reportable bundle of one rule run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{Artifact, Rule};

/// Unique, enriched artifacts found by one rule run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub rule_id: String,
    pub title: String,
    pub description: String,
    /// Comma-separated names of the analyzers that contributed artifacts
    pub source: String,
    pub tags: BTreeSet<String>,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Build the alert for a rule run at `created_at`
    ///
    /// Returns `None` when there is nothing to report.
    pub fn from_rule(rule: &Rule, artifacts: Vec<Artifact>, created_at: DateTime<Utc>) -> Option<Self> {
        if artifacts.is_empty() {
            return None;
        }

        let sources: BTreeSet<&str> = artifacts
            .iter()
            .map(|a| a.source.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        let source = sources.into_iter().collect::<Vec<_>>().join(",");

        Some(Self {
            id: Uuid::new_v4(),
            rule_id: rule.id.clone(),
            title: rule.title.clone(),
            description: rule.description.clone(),
            source,
            tags: rule.tags.iter().cloned().collect(),
            artifacts,
            created_at,
        })
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }
}
