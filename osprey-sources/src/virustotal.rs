//! VirusTotal Intelligence search analyzer
//!
//! Pages through `/intelligence/search` results with the `meta.cursor`
//! continuation token. URL objects yield their URL, everything else its id
//! (file hash, domain or IP).

use async_trait::async_trait;
use osprey_core::RawMatch;
use osprey_net::{fetch_json, Cursor, Page};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Analyzer, SourceError};

const SEARCH_URL: &str = "https://www.virustotal.com/api/v3/intelligence/search";

pub struct VirusTotalIntelligence {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchObject>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    #[serde(rename = "type")]
    object_type: String,
    id: String,
    #[serde(default)]
    attributes: ObjectAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectAttributes {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchMeta {
    cursor: Option<String>,
}

impl VirusTotalIntelligence {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn to_page(response: SearchResponse) -> Page<Option<RawMatch>> {
        let items = response
            .data
            .into_iter()
            .map(|object| match object.object_type.as_str() {
                "url" => object.attributes.url.map(RawMatch::Literal),
                _ => Some(RawMatch::Literal(object.id)),
            })
            .collect();

        match response.meta.and_then(|m| m.cursor).filter(|c| !c.is_empty()) {
            Some(cursor) => Page::with_next(items, Cursor::Token(cursor)),
            None => Page::last(items),
        }
    }
}

#[async_trait]
impl Analyzer for VirusTotalIntelligence {
    fn name(&self) -> &str {
        "virustotal_intelligence"
    }

    async fn fetch(
        &self,
        query: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Option<RawMatch>>, SourceError> {
        let mut url = format!("{}?query={}", SEARCH_URL, urlencoding::encode(query));
        if let Some(Cursor::Token(token)) = &cursor {
            url.push_str(&format!("&cursor={}", urlencoding::encode(token)));
        }
        debug!("VirusTotal intelligence search: {}", query);

        let request = self.client.get(&url).header("x-apikey", &self.api_key);
        let response: SearchResponse = fetch_json(request).await?;
        Ok(Self::to_page(response))
    }
}
