//! Shodan InternetDB enricher: open ports, CPEs and hostnames per IP

use async_trait::async_trait;
use osprey_core::{Cpe, EnricherKind, Enrichment, EnrichmentRecord, Port, ReverseDnsName};
use osprey_net::{fetch_json, NetError};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Enricher, Memo, SourceError};

const API_URL: &str = "https://internetdb.shodan.io";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InternetDbResponse {
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub cpes: Vec<String>,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

impl InternetDbResponse {
    fn record(&self, enrichment: Enrichment) -> Option<EnrichmentRecord> {
        let record = match enrichment {
            Enrichment::Ports => {
                EnrichmentRecord::Ports(self.ports.iter().map(|&port| Port { port }).collect())
            }
            Enrichment::Cpes => EnrichmentRecord::Cpes(
                self.cpes.iter().map(|name| Cpe { name: name.clone() }).collect(),
            ),
            Enrichment::ReverseDns => EnrichmentRecord::ReverseDns(
                self.hostnames
                    .iter()
                    .map(|name| ReverseDnsName { name: name.clone() })
                    .collect(),
            ),
            _ => return None,
        };
        (!record.is_empty()).then_some(record)
    }
}

pub struct Shodan {
    client: Client,
    memo: Memo<Option<InternetDbResponse>>,
}

impl Shodan {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            memo: Memo::new(),
        }
    }

    async fn fetch(&self, ip: &str) -> Result<Option<InternetDbResponse>, SourceError> {
        let url = format!("{}/{}", API_URL, ip);
        debug!("InternetDB lookup for {}", ip);

        // 404 means the IP has never been seen by a scan
        match fetch_json::<InternetDbResponse>(self.client.get(&url)).await {
            Ok(info) => Ok(Some(info)),
            Err(NetError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Enricher for Shodan {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Shodan
    }

    async fn lookup(
        &self,
        enrichment: Enrichment,
        key: &str,
    ) -> Result<Option<EnrichmentRecord>, SourceError> {
        if !self.kind().enrichments().contains(&enrichment) {
            return Err(SourceError::Unsupported {
                enricher: self.kind(),
                enrichment,
            });
        }

        let info = self.memo.get_or_try_init(key, || self.fetch(key)).await?;
        Ok(info.and_then(|i| i.record(enrichment)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_internetdb() {
        let info: InternetDbResponse = serde_json::from_str(
            r#"{
                "cpes": ["cpe:/a:openbsd:openssh:8.9p1"],
                "hostnames": ["dns.google"],
                "ip": "8.8.8.8",
                "ports": [53, 443],
                "tags": [],
                "vulns": []
            }"#,
        )
        .unwrap();

        assert_eq!(
            info.record(Enrichment::Ports),
            Some(EnrichmentRecord::Ports(vec![Port { port: 53 }, Port { port: 443 }]))
        );
        assert_eq!(
            info.record(Enrichment::ReverseDns),
            Some(EnrichmentRecord::ReverseDns(vec![ReverseDnsName {
                name: "dns.google".to_string()
            }]))
        );
        assert!(matches!(info.record(Enrichment::Cpes), Some(EnrichmentRecord::Cpes(c)) if c.len() == 1));
        assert_eq!(info.record(Enrichment::Whois), None);
    }

    #[test]
    fn test_empty_lists_yield_nothing() {
        let info = InternetDbResponse::default();
        assert_eq!(info.record(Enrichment::Ports), None);
    }
}
