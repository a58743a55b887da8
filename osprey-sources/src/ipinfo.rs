//! IPInfo enricher: geolocation and autonomous system per IP

use async_trait::async_trait;
use osprey_core::{AutonomousSystem, EnricherKind, Enrichment, EnrichmentRecord, Geolocation};
use osprey_net::{fetch_json, NetError};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::{Enricher, Memo, SourceError};

const API_URL: &str = "https://ipinfo.io";

/// `org` is reported as "AS15169 Google LLC"
static ASN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^AS(\d+)\b").unwrap());

#[derive(Debug, Clone, Deserialize)]
pub struct IpInfoResponse {
    pub ip: String,
    pub country: Option<String>,
    pub country_name: Option<String>,
    pub org: Option<String>,
}

impl IpInfoResponse {
    pub fn asn(&self) -> Option<u32> {
        let org = self.org.as_deref()?;
        ASN_REGEX.captures(org)?.get(1)?.as_str().parse().ok()
    }

    pub fn geolocation(&self) -> Option<Geolocation> {
        let code = self.country.clone().filter(|c| !c.is_empty())?;
        Some(Geolocation {
            country: self.country_name.clone().unwrap_or_else(|| code.clone()),
            country_code: code,
        })
    }
}

pub struct IpInfo {
    client: Client,
    token: Option<String>,
    memo: Memo<Option<IpInfoResponse>>,
}

impl IpInfo {
    pub fn new(client: Client, token: Option<String>) -> Self {
        Self {
            client,
            token,
            memo: Memo::new(),
        }
    }

    async fn fetch(&self, ip: &str) -> Result<Option<IpInfoResponse>, SourceError> {
        let url = format!("{}/{}/json", API_URL, ip);
        debug!("IPInfo lookup for {}", ip);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match fetch_json::<IpInfoResponse>(request).await {
            Ok(info) => Ok(Some(info)),
            Err(NetError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Enricher for IpInfo {
    fn kind(&self) -> EnricherKind {
        EnricherKind::IpInfo
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
        let Some(info) = info else {
            return Ok(None);
        };

        let record = match enrichment {
            Enrichment::AutonomousSystem => info
                .asn()
                .map(|asn| EnrichmentRecord::AutonomousSystem(AutonomousSystem { asn })),
            _ => info.geolocation().map(EnrichmentRecord::Geolocation),
        };
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> IpInfoResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_asn_from_org() {
        let info = response(r#"{"ip": "8.8.8.8", "country": "US", "org": "AS15169 Google LLC"}"#);
        assert_eq!(info.asn(), Some(15169));

        let bare = response(r#"{"ip": "10.0.0.1", "bogon": true}"#);
        assert_eq!(bare.asn(), None);
        assert!(bare.geolocation().is_none());
    }

    #[test]
    fn test_geolocation_falls_back_to_code() {
        let info = response(r#"{"ip": "1.1.1.1", "country": "AU"}"#);
        assert_eq!(
            info.geolocation(),
            Some(Geolocation {
                country: "AU".to_string(),
                country_code: "AU".to_string()
            })
        );

        let named = response(r#"{"ip": "1.1.1.1", "country": "AU", "country_name": "Australia"}"#);
        assert_eq!(named.geolocation().unwrap().country, "Australia");
    }
}
