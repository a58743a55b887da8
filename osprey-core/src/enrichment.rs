//! Enrichment records and the static enricher dispatch table
//!
//! Each [`EnricherKind`] declares which [`Enrichment`]s it can produce, and
//! each [`Enrichment`] declares which data types it applies to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DataType;

/// Autonomous system an IP belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomousSystem {
    pub asn: u32,
}

/// Country-level geolocation of an IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geolocation {
    pub country: String,
    pub country_code: String,
}

/// Registration data for a registrable domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisRecord {
    /// Registrable domain the record was looked up for
    pub domain: String,
    pub registrar: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub updated_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub contacts: Vec<WhoisContact>,
}

/// One registrant/admin/tech contact of a WHOIS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisContact {
    pub role: String,
    pub name: Option<String>,
    pub organization: Option<String>,
    pub email: Option<String>,
}

/// A resolved DNS resource record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Resource type (A, AAAA, CNAME, TXT, NS)
    pub resource: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseDnsName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpe {
    pub name: String,
}

/// Kinds of records that can be attached to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrichment {
    AutonomousSystem,
    Geolocation,
    Whois,
    Dns,
    ReverseDns,
    Ports,
    Cpes,
}

impl Enrichment {
    /// Data types this enrichment is meaningful for
    pub fn applicable_types(&self) -> &'static [DataType] {
        match self {
            Enrichment::Whois | Enrichment::Dns => &[DataType::Domain, DataType::Url],
            Enrichment::AutonomousSystem
            | Enrichment::Geolocation
            | Enrichment::ReverseDns
            | Enrichment::Ports
            | Enrichment::Cpes => &[DataType::Ip],
        }
    }

    pub fn applies_to(&self, data_type: Option<DataType>) -> bool {
        data_type.is_some_and(|dt| self.applicable_types().contains(&dt))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Enrichment::AutonomousSystem => "autonomous_system",
            Enrichment::Geolocation => "geolocation",
            Enrichment::Whois => "whois",
            Enrichment::Dns => "dns",
            Enrichment::ReverseDns => "reverse_dns",
            Enrichment::Ports => "ports",
            Enrichment::Cpes => "cpes",
        }
    }
}

impl fmt::Display for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of enricher back-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnricherKind {
    /// Registration data (RDAP)
    Whois,
    /// Geolocation and ASN
    #[serde(rename = "ipinfo")]
    IpInfo,
    /// Open ports, CPEs and hostnames (port-scan data)
    Shodan,
    /// DNS resolution
    GooglePublicDns,
}

impl EnricherKind {
    pub const ALL: [EnricherKind; 4] = [
        EnricherKind::Whois,
        EnricherKind::IpInfo,
        EnricherKind::Shodan,
        EnricherKind::GooglePublicDns,
    ];

    pub fn all() -> Vec<EnricherKind> {
        Self::ALL.to_vec()
    }

    /// Enrichments this enricher produces
    pub fn enrichments(&self) -> &'static [Enrichment] {
        match self {
            EnricherKind::Whois => &[Enrichment::Whois],
            EnricherKind::IpInfo => &[Enrichment::AutonomousSystem, Enrichment::Geolocation],
            EnricherKind::Shodan => &[Enrichment::Ports, Enrichment::Cpes, Enrichment::ReverseDns],
            EnricherKind::GooglePublicDns => &[Enrichment::Dns],
        }
    }

    pub fn applies_to(&self, data_type: Option<DataType>) -> bool {
        self.enrichments().iter().any(|e| e.applies_to(data_type))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnricherKind::Whois => "whois",
            EnricherKind::IpInfo => "ipinfo",
            EnricherKind::Shodan => "shodan",
            EnricherKind::GooglePublicDns => "google_public_dns",
        }
    }
}

impl fmt::Display for EnricherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one enrichment lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EnrichmentRecord {
    AutonomousSystem(AutonomousSystem),
    Geolocation(Geolocation),
    Whois(WhoisRecord),
    Dns(Vec<DnsRecord>),
    ReverseDns(Vec<ReverseDnsName>),
    Ports(Vec<Port>),
    Cpes(Vec<Cpe>),
}

impl EnrichmentRecord {
    pub fn kind(&self) -> Enrichment {
        match self {
            EnrichmentRecord::AutonomousSystem(_) => Enrichment::AutonomousSystem,
            EnrichmentRecord::Geolocation(_) => Enrichment::Geolocation,
            EnrichmentRecord::Whois(_) => Enrichment::Whois,
            EnrichmentRecord::Dns(_) => Enrichment::Dns,
            EnrichmentRecord::ReverseDns(_) => Enrichment::ReverseDns,
            EnrichmentRecord::Ports(_) => Enrichment::Ports,
            EnrichmentRecord::Cpes(_) => Enrichment::Cpes,
        }
    }

    /// Repeatable records with no entries carry no information
    pub fn is_empty(&self) -> bool {
        match self {
            EnrichmentRecord::Dns(v) => v.is_empty(),
            EnrichmentRecord::ReverseDns(v) => v.is_empty(),
            EnrichmentRecord::Ports(v) => v.is_empty(),
            EnrichmentRecord::Cpes(v) => v.is_empty(),
            _ => false,
        }
    }
}
