//! Artifacts discovered by analyzers
//!
//! An [`Artifact`] is one indicator (IP, domain, URL, hash, ...) with its
//! derived [`DataType`] and any enrichment records attached to it.
//! Analyzer output enters as [`RawMatch`] and is turned into artifacts by
//! [`normalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::net::IpAddr;
use uuid::Uuid;

use crate::{
    url_host, AutonomousSystem, Cpe, CoreError, DataType, DnsRecord, Enrichment,
    EnrichmentRecord, Geolocation, Port, ReverseDnsName, WhoisRecord,
};

/// An indicator with its classification and attached enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// The indicator payload
    pub data: String,
    /// Derived classification; `None` means the artifact is invalid
    pub data_type: Option<DataType>,
    /// Name of the analyzer that produced it
    pub source: String,
    /// Owning rule
    pub rule_id: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_system: Option<AutonomousSystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<Geolocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois_record: Option<WhoisRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_records: Vec<DnsRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reverse_dns_names: Vec<ReverseDnsName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<Cpe>,
}

impl Artifact {
    /// Build an artifact, deriving its data type from `data`
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        let data_type = DataType::classify(&data);
        Self {
            id: Uuid::new_v4(),
            data,
            data_type,
            source: String::new(),
            rule_id: String::new(),
            created_at: Utc::now(),
            autonomous_system: None,
            geolocation: None,
            whois_record: None,
            dns_records: Vec::new(),
            reverse_dns_names: Vec::new(),
            ports: Vec::new(),
            cpes: Vec::new(),
        }
    }

    /// Build an artifact from a JSON scalar
    ///
    /// Arrays and objects are not indicator payloads and are rejected.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::String(s) => Ok(Self::new(s.as_str())),
            Value::Number(n) => Ok(Self::new(n.to_string())),
            Value::Bool(b) => Ok(Self::new(b.to_string())),
            Value::Null => Err(CoreError::InvalidPayload("null".to_string())),
            Value::Array(_) => Err(CoreError::InvalidPayload(
                "array given where a scalar payload is expected".to_string(),
            )),
            Value::Object(_) => Err(CoreError::InvalidPayload(
                "object given where a scalar payload is expected".to_string(),
            )),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_rule_id(mut self, rule_id: &str) -> Self {
        self.rule_id = rule_id.to_string();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.data_type.is_some()
    }

    /// Domain to use for WHOIS/DNS lookups
    ///
    /// The payload itself for domains, the host for URLs. URLs whose host is
    /// an IP literal have no domain.
    pub fn domain(&self) -> Option<String> {
        let host = match self.data_type? {
            DataType::Domain => self.data.as_str(),
            DataType::Url => url_host(&self.data)?,
            _ => return None,
        };
        let host = host.trim_end_matches('.');
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return None;
        }
        Some(host.to_ascii_lowercase())
    }

    /// Key passed to an enricher for the given enrichment
    pub fn enrichment_key(&self, enrichment: Enrichment) -> Option<String> {
        if !enrichment.applies_to(self.data_type) {
            return None;
        }
        match self.data_type? {
            DataType::Ip => Some(self.data.clone()),
            _ => self.domain(),
        }
    }

    /// Whether a non-empty record of this kind is already attached
    pub fn has(&self, enrichment: Enrichment) -> bool {
        match enrichment {
            Enrichment::AutonomousSystem => self.autonomous_system.is_some(),
            Enrichment::Geolocation => self.geolocation.is_some(),
            Enrichment::Whois => self.whois_record.is_some(),
            Enrichment::Dns => !self.dns_records.is_empty(),
            Enrichment::ReverseDns => !self.reverse_dns_names.is_empty(),
            Enrichment::Ports => !self.ports.is_empty(),
            Enrichment::Cpes => !self.cpes.is_empty(),
        }
    }

    /// Whether the enrichment applies and is still missing
    pub fn can_enrich(&self, enrichment: Enrichment) -> bool {
        enrichment.applies_to(self.data_type) && !self.has(enrichment)
    }

    /// Attach a record, replacing any previous one of the same kind
    pub fn attach(&mut self, record: EnrichmentRecord) {
        match record {
            EnrichmentRecord::AutonomousSystem(r) => self.autonomous_system = Some(r),
            EnrichmentRecord::Geolocation(r) => self.geolocation = Some(r),
            EnrichmentRecord::Whois(r) => self.whois_record = Some(r),
            EnrichmentRecord::Dns(r) => self.dns_records = r,
            EnrichmentRecord::ReverseDns(r) => self.reverse_dns_names = r,
            EnrichmentRecord::Ports(r) => self.ports = r,
            EnrichmentRecord::Cpes(r) => self.cpes = r,
        }
    }
}

/// One element of analyzer output, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawMatch {
    /// A bare payload string
    Literal(String),
    /// An artifact the analyzer already built
    Typed(Artifact),
}

impl RawMatch {
    /// Convert a JSON element of analyzer output
    ///
    /// `null` is a hole and yields `Ok(None)`. Objects must carry a scalar
    /// `data` field and may carry `source`. Arrays are rejected.
    pub fn from_value(value: Value) -> Result<Option<Self>, CoreError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(RawMatch::Literal(s))),
            Value::Number(_) | Value::Bool(_) => {
                Ok(Some(RawMatch::Typed(Artifact::from_value(&value)?)))
            }
            Value::Object(map) => {
                let data = map.get("data").ok_or_else(|| {
                    CoreError::InvalidPayload("object without a data field".to_string())
                })?;
                let mut artifact = Artifact::from_value(data)?;
                if let Some(source) = map.get("source").and_then(Value::as_str) {
                    artifact = artifact.with_source(source);
                }
                Ok(Some(RawMatch::Typed(artifact)))
            }
            Value::Array(_) => Err(CoreError::InvalidPayload(
                "array given where a scalar payload is expected".to_string(),
            )),
        }
    }

    pub fn into_artifact(self) -> Artifact {
        match self {
            RawMatch::Literal(data) => Artifact::new(data),
            RawMatch::Typed(artifact) => artifact,
        }
    }
}

impl From<&str> for RawMatch {
    fn from(s: &str) -> Self {
        RawMatch::Literal(s.to_string())
    }
}

impl From<String> for RawMatch {
    fn from(s: String) -> Self {
        RawMatch::Literal(s)
    }
}

impl From<Artifact> for RawMatch {
    fn from(artifact: Artifact) -> Self {
        RawMatch::Typed(artifact)
    }
}

/// Turn raw analyzer output into a sorted, unique, valid artifact list
///
/// Holes are dropped, every element is coerced to an artifact stamped with
/// `source`, the list is sorted by `(data_type, data)`, duplicates by `data`
/// collapse to the first occurrence and unclassified artifacts are removed.
pub fn normalize<I>(raw: I, source: &str) -> Vec<Artifact>
where
    I: IntoIterator<Item = Option<RawMatch>>,
{
    let mut artifacts: Vec<Artifact> = raw
        .into_iter()
        .flatten()
        .map(|m| m.into_artifact().with_source(source))
        .collect();

    artifacts.sort_by(|a, b| (a.data_type, &a.data).cmp(&(b.data_type, &b.data)));

    let mut seen: HashSet<String> = HashSet::new();
    artifacts
        .into_iter()
        .filter(|a| seen.insert(a.data.clone()))
        .filter(Artifact::is_valid)
        .collect()
}
