//! WHOIS enricher backed by RDAP
//!
//! Lookups are made for the registrable domain, so every subdomain of one
//! registration shares a single memoized upstream call.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use osprey_core::{EnricherKind, Enrichment, EnrichmentRecord, WhoisContact, WhoisRecord};
use osprey_net::{fetch_json, NetError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{Enricher, Memo, SourceError};

const RDAP_URL: &str = "https://rdap.org/domain";

pub struct Whois {
    client: Client,
    memo: Memo<Option<WhoisRecord>>,
}

#[derive(Debug, Deserialize)]
struct RdapDomain {
    #[serde(rename = "ldhName")]
    ldh_name: Option<String>,
    #[serde(default)]
    events: Vec<RdapEvent>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
}

#[derive(Debug, Deserialize)]
struct RdapEvent {
    #[serde(rename = "eventAction")]
    action: String,
    #[serde(rename = "eventDate")]
    date: String,
}

#[derive(Debug, Deserialize)]
struct RdapEntity {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(rename = "vcardArray")]
    vcard: Option<Value>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
}

/// Registrable part of a host name per the public suffix list
///
/// Hosts that are themselves a public suffix come back unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = psl::domain_str(&host).map(str::to_string);
    domain.unwrap_or(host)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.date_naive())
        .ok()
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Pull one text property (`fn`, `org`, `email`) out of a jCard
fn vcard_property(vcard: &Value, name: &str) -> Option<String> {
    vcard
        .get(1)?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .find(|prop| prop.first().and_then(Value::as_str) == Some(name))
        .and_then(|prop| prop.get(3))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RdapEntity {
    /// This entity and its nested entities, depth first
    fn flatten(&self) -> Vec<&RdapEntity> {
        let mut out = vec![self];
        for child in &self.entities {
            out.extend(child.flatten());
        }
        out
    }
}

impl Whois {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            memo: Memo::new(),
        }
    }

    fn to_record(domain: &str, rdap: RdapDomain) -> WhoisRecord {
        let event = |action: &str| {
            rdap.events
                .iter()
                .find(|e| e.action == action)
                .and_then(|e| parse_date(&e.date))
        };

        let entities: Vec<&RdapEntity> = rdap.entities.iter().flat_map(|e| e.flatten()).collect();

        let registrar = entities
            .iter()
            .find(|e| e.roles.iter().any(|r| r == "registrar"))
            .and_then(|e| e.vcard.as_ref())
            .and_then(|v| vcard_property(v, "fn"));

        let contacts = entities
            .iter()
            .flat_map(|entity| {
                entity
                    .roles
                    .iter()
                    .filter(|r| matches!(r.as_str(), "registrant" | "administrative" | "technical"))
                    .map(move |role| {
                        let vcard = entity.vcard.as_ref();
                        WhoisContact {
                            role: role.clone(),
                            name: vcard.and_then(|v| vcard_property(v, "fn")),
                            organization: vcard.and_then(|v| vcard_property(v, "org")),
                            email: vcard.and_then(|v| vcard_property(v, "email")),
                        }
                    })
            })
            .collect();

        WhoisRecord {
            domain: rdap
                .ldh_name
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| domain.to_string()),
            registrar,
            created_on: event("registration"),
            updated_on: event("last changed"),
            expires_on: event("expiration"),
            contacts,
        }
    }

    async fn fetch(&self, domain: &str) -> Result<Option<WhoisRecord>, SourceError> {
        let url = format!("{}/{}", RDAP_URL, urlencoding::encode(domain));
        debug!("RDAP lookup for {}", domain);

        match fetch_json::<RdapDomain>(self.client.get(&url)).await {
            Ok(rdap) => Ok(Some(Self::to_record(domain, rdap))),
            Err(NetError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Enricher for Whois {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Whois
    }

    async fn lookup(
        &self,
        enrichment: Enrichment,
        key: &str,
    ) -> Result<Option<EnrichmentRecord>, SourceError> {
        if enrichment != Enrichment::Whois {
            return Err(SourceError::Unsupported {
                enricher: self.kind(),
                enrichment,
            });
        }

        let domain = registrable_domain(key);
        let record = self
            .memo
            .get_or_try_init(&domain, || self.fetch(&domain))
            .await?;
        Ok(record.map(EnrichmentRecord::Whois))
    }
}
