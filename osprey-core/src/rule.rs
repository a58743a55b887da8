//! Hunting rules
//!
//! A rule binds one or more analyzer queries to enrichment and emitter
//! choices. Rules are read-only input to the pipeline.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::{Artifact, CoreError, DataType, EnricherKind, QueryOptions};

/// One analyzer query of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBinding {
    /// Analyzer name (e.g. `virustotal_intelligence`)
    pub analyzer: String,
    pub query: String,
    #[serde(default)]
    pub options: QueryOptions,
}

/// An emitter selection with its settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterBinding {
    /// Emitter name (`console`, `webhook`)
    pub emitter: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl EmitterBinding {
    pub fn console() -> Self {
        Self {
            emitter: "console".to_string(),
            url: None,
            headers: BTreeMap::new(),
        }
    }
}

/// An exclusion: literal payload or `/regex/`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FalsePositive {
    Literal(String),
    Pattern(Regex),
}

impl FalsePositive {
    pub fn matches(&self, data: &str) -> bool {
        match self {
            FalsePositive::Literal(s) => s == data,
            FalsePositive::Pattern(re) => re.is_match(data),
        }
    }
}

impl TryFrom<String> for FalsePositive {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.len() >= 2 && s.starts_with('/') && s.ends_with('/') {
            let pattern = &s[1..s.len() - 1];
            let re = Regex::new(pattern)
                .map_err(|e| CoreError::Validation(format!("bad falsepositive {}: {}", s, e)))?;
            Ok(FalsePositive::Pattern(re))
        } else {
            Ok(FalsePositive::Literal(s))
        }
    }
}

impl From<FalsePositive> for String {
    fn from(fp: FalsePositive) -> Self {
        fp.to_string()
    }
}

impl fmt::Display for FalsePositive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FalsePositive::Literal(s) => f.write_str(s),
            FalsePositive::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl PartialEq for FalsePositive {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// A user-authored hunting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub queries: Vec<QueryBinding>,
    /// Data types allowed into an alert
    #[serde(default = "DataType::all")]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub falsepositives: Vec<FalsePositive>,
    #[serde(default = "EnricherKind::all")]
    pub enrichers: Vec<EnricherKind>,
    #[serde(default = "default_emitters")]
    pub emitters: Vec<EmitterBinding>,
    /// Decay window in seconds; `None` dedups forever
    #[serde(default, alias = "artifact_ttl")]
    pub artifact_lifetime: Option<u64>,
}

fn default_emitters() -> Vec<EmitterBinding> {
    vec![EmitterBinding::console()]
}

impl Rule {
    /// Parse and validate a TOML rule
    pub fn from_toml(text: &str) -> Result<Self, CoreError> {
        let rule: Rule = toml::from_str(text).map_err(|e| CoreError::RuleParse(e.to_string()))?;
        rule.validate()?;
        Ok(rule)
    }

    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("rule id must not be empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation(format!("rule {} has no title", self.id)));
        }
        if self.queries.is_empty() {
            return Err(CoreError::Validation(format!("rule {} has no queries", self.id)));
        }
        if let Some(q) = self.queries.iter().find(|q| q.analyzer.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "rule {} has a query without analyzer: {}",
                self.id, q.query
            )));
        }
        if self.data_types.is_empty() {
            return Err(CoreError::Validation(format!("rule {} allows no data types", self.id)));
        }
        Ok(())
    }

    pub fn is_falsepositive(&self, data: &str) -> bool {
        self.falsepositives.iter().any(|fp| fp.matches(data))
    }

    /// Whether an artifact passes the rule's data type and false positive filters
    pub fn admits(&self, artifact: &Artifact) -> bool {
        let type_allowed = artifact
            .data_type
            .is_some_and(|dt| self.data_types.contains(&dt));
        type_allowed && !self.is_falsepositive(&artifact.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = r#"
id = "c2-hunt"
title = "C2 infrastructure"
description = "Cobalt Strike team servers"
tags = ["c2", "cobaltstrike"]
falsepositives = ["8.8.8.8", "/\\.example\\.org$/"]
artifact_ttl = 3600
enrichers = ["whois", "ipinfo"]

[[queries]]
analyzer = "onyphe"
query = "category:datascan product:\"Cobalt Strike\""

[queries.options]
retry_times = 5
ignore_error = true

[[queries]]
analyzer = "feed"
query = "https://feeds.example.net/c2.txt"

[[emitters]]
emitter = "webhook"
url = "https://hooks.example.net/osprey"
"#;

    #[test]
    fn test_parse_rule() {
        let rule = Rule::from_toml(RULE).unwrap();
        assert_eq!(rule.id, "c2-hunt");
        assert_eq!(rule.queries.len(), 2);
        assert_eq!(rule.queries[0].options.retry_times, Some(5));
        assert_eq!(rule.queries[1].options, QueryOptions::default());
        assert_eq!(rule.artifact_lifetime, Some(3600));
        assert_eq!(rule.enrichers, vec![EnricherKind::Whois, EnricherKind::IpInfo]);
        assert_eq!(rule.data_types, DataType::all());
        assert_eq!(rule.emitters[0].url.as_deref(), Some("https://hooks.example.net/osprey"));
    }

    #[test]
    fn test_defaults_when_omitted() {
        let rule = Rule::from_toml(
            r#"
id = "r"
title = "t"
[[queries]]
analyzer = "feed"
query = "https://x.example.net/feed"
"#,
        )
        .unwrap();
        assert_eq!(rule.artifact_lifetime, None);
        assert_eq!(rule.enrichers, EnricherKind::all());
        assert_eq!(rule.emitters, vec![EmitterBinding::console()]);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Rule::from_toml("id = \"r\"\ntitle = \"t\"\nqueries = []"),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            Rule::from_toml("title = \"t\""),
            Err(CoreError::RuleParse(_))
        ));
    }

    #[test]
    fn test_falsepositives() {
        let rule = Rule::from_toml(RULE).unwrap();
        assert!(rule.is_falsepositive("8.8.8.8"));
        assert!(rule.is_falsepositive("cdn.example.org"));
        assert!(!rule.is_falsepositive("evil.example.com"));

        assert!(!rule.admits(&Artifact::new("8.8.8.8")));
        assert!(rule.admits(&Artifact::new("1.2.3.4")));
    }

    #[test]
    fn test_data_type_allow_list() {
        let mut rule = Rule::from_toml(RULE).unwrap();
        rule.data_types = vec![DataType::Domain];
        assert!(!rule.admits(&Artifact::new("1.2.3.4")));
        assert!(rule.admits(&Artifact::new("evil.example.com")));
        assert!(!rule.admits(&Artifact::new("not an indicator")));
    }

    #[test]
    fn test_bad_falsepositive_pattern() {
        assert!(FalsePositive::try_from("/([/".to_string()).is_err());
    }
}
