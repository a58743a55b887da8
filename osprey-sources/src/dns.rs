//! Google Public DNS-over-HTTPS enricher

use async_trait::async_trait;
use futures::future::join_all;
use osprey_core::{DnsRecord, EnricherKind, Enrichment, EnrichmentRecord};
use osprey_net::fetch_json;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Enricher, SourceError};

const RESOLVE_URL: &str = "https://dns.google/resolve";

/// Resource types resolved for every domain, with their wire type codes
const RESOURCE_TYPES: &[(&str, u16)] = &[
    ("A", 1),
    ("AAAA", 28),
    ("CNAME", 5),
    ("TXT", 16),
    ("NS", 2),
];

pub struct GooglePublicDns {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<Answer>,
}

#[derive(Debug, Deserialize)]
struct Answer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl GooglePublicDns {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Keep answers of the requested type; CNAME chains show up in A/AAAA answers too
    fn records(resource: &str, code: u16, response: ResolveResponse) -> Vec<DnsRecord> {
        response
            .answer
            .into_iter()
            .filter(|a| a.record_type == code)
            .map(|a| DnsRecord {
                resource: resource.to_string(),
                value: a.data.trim_matches('"').to_string(),
            })
            .collect()
    }

    async fn resolve(&self, name: &str, resource: &str, code: u16) -> Result<Vec<DnsRecord>, SourceError> {
        let url = format!(
            "{}?name={}&type={}",
            RESOLVE_URL,
            urlencoding::encode(name),
            resource
        );
        let response: ResolveResponse = fetch_json(self.client.get(&url)).await?;
        Ok(Self::records(resource, code, response))
    }

    /// Combine per-type answers; a failed type is skipped unless every type failed
    fn merge(
        key: &str,
        results: Vec<(&str, Result<Vec<DnsRecord>, SourceError>)>,
    ) -> Result<Option<EnrichmentRecord>, SourceError> {
        let mut records = Vec::new();
        let mut last_error = None;
        let mut resolved = 0;

        for (resource, result) in results {
            match result {
                Ok(found) => {
                    resolved += 1;
                    records.extend(found);
                }
                Err(e) => {
                    warn!("{} lookup for {} failed: {}", resource, key, e);
                    last_error = Some(e);
                }
            }
        }

        if resolved == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(EnrichmentRecord::Dns(records)))
    }
}

#[async_trait]
impl Enricher for GooglePublicDns {
    fn kind(&self) -> EnricherKind {
        EnricherKind::GooglePublicDns
    }

    async fn lookup(
        &self,
        enrichment: Enrichment,
        key: &str,
    ) -> Result<Option<EnrichmentRecord>, SourceError> {
        if enrichment != Enrichment::Dns {
            return Err(SourceError::Unsupported {
                enricher: self.kind(),
                enrichment,
            });
        }

        debug!("Resolving {}", key);
        let results = join_all(RESOURCE_TYPES.iter().map(|(resource, code)| async move {
            (*resource, self.resolve(key, resource, *code).await)
        }))
        .await;

        Self::merge(key, results)
    }
}
