//! Stored rules
//!
//! `osprey search` takes either a rule file or the id of a rule saved by an
//! earlier run. Rules loaded from a file are saved back under their id, and a
//! file that changes a stored rule is flagged so the caller can ask before
//! overwriting it.

use chrono::{DateTime, Utc};
use osprey_core::{CoreError, Rule};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::StoreError;

/// A saved rule with the TOML it was parsed from
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRule {
    pub rule: Rule,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for rules, keyed by rule id
pub trait RuleStore: Send + Sync {
    fn find_rule(&self, id: &str) -> Result<Option<StoredRule>, StoreError>;

    /// Insert the rule or replace the one stored under its id
    fn save_rule(&self, rule: &Rule, body: &str, updated_at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("{0} is neither a stored rule id nor a rule file")]
    NotFound(String),

    #[error(transparent)]
    Rule(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a loaded rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    Stored,
    /// Read from a file; `changed` is set when it differs from the stored rule with the same id
    File { changed: bool },
}

#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub rule: Rule,
    pub body: String,
    pub origin: RuleOrigin,
}

impl LoadedRule {
    /// Saving this rule would replace a different stored version
    pub fn overwrites(&self) -> bool {
        matches!(self.origin, RuleOrigin::File { changed: true })
    }
}

pub struct RuleLoader<'a> {
    store: &'a dyn RuleStore,
}

impl<'a> RuleLoader<'a> {
    pub fn new(store: &'a dyn RuleStore) -> Self {
        Self { store }
    }

    /// Resolve a stored rule id first, then a file path
    pub fn load(&self, path_or_id: &str) -> Result<LoadedRule, RuleLoadError> {
        if let Some(stored) = self.store.find_rule(path_or_id)? {
            debug!("Using stored rule {}", stored.rule.id);
            return Ok(LoadedRule {
                rule: stored.rule,
                body: stored.body,
                origin: RuleOrigin::Stored,
            });
        }

        let path = Path::new(path_or_id);
        if !path.is_file() {
            return Err(RuleLoadError::NotFound(path_or_id.to_string()));
        }

        let body = fs::read_to_string(path).map_err(CoreError::from)?;
        let rule = Rule::from_toml(&body)?;
        let changed = self
            .store
            .find_rule(&rule.id)?
            .is_some_and(|stored| stored.rule != rule);

        Ok(LoadedRule {
            rule,
            body,
            origin: RuleOrigin::File { changed },
        })
    }

    pub fn save(&self, loaded: &LoadedRule, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.save_rule(&loaded.rule, &loaded.body, at)
    }
}
