//! Onyphe search analyzer (page-number pagination)

use async_trait::async_trait;
use osprey_core::RawMatch;
use osprey_net::{fetch_json, Cursor, Page};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Analyzer, SourceError};

const SEARCH_URL: &str = "https://www.onyphe.io/api/v2/search/";

pub struct Onyphe {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    max_page: u32,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    ip: Option<String>,
}

impl Onyphe {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn to_page(response: SearchResponse) -> Result<Page<Option<RawMatch>>, SourceError> {
        if response.error != 0 {
            return Err(SourceError::Parse(format!(
                "onyphe error {}: {}",
                response.error,
                response.text.unwrap_or_default()
            )));
        }

        let items = response
            .results
            .into_iter()
            .map(|r| r.ip.map(RawMatch::Literal))
            .collect();

        if response.page < response.max_page {
            Ok(Page::with_next(items, Cursor::Page(response.page + 1)))
        } else {
            Ok(Page::last(items))
        }
    }
}

#[async_trait]
impl Analyzer for Onyphe {
    fn name(&self) -> &str {
        "onyphe"
    }

    async fn fetch(
        &self,
        query: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Option<RawMatch>>, SourceError> {
        let page = match cursor {
            Some(Cursor::Page(n)) => n,
            _ => 1,
        };
        let url = format!("{}?q={}&page={}", SEARCH_URL, urlencoding::encode(query), page);
        debug!("Onyphe search page {}: {}", page, query);

        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("bearer {}", self.api_key));
        let response: SearchResponse = fetch_json(request).await?;
        Self::to_page(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_numbers_advance_until_max() {
        let first: SearchResponse = serde_json::from_str(
            r#"{"error": 0, "page": 1, "max_page": 2,
                "results": [{"ip": "1.2.3.4"}, {"ip": "5.6.7.8"}, {"domain": ["x.example"]}]}"#,
        )
        .unwrap();
        let page = Onyphe::to_page(first).unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.items[2].is_none());
        assert_eq!(page.next, Some(Cursor::Page(2)));

        let last: SearchResponse =
            serde_json::from_str(r#"{"error": 0, "page": 2, "max_page": 2, "results": []}"#)
                .unwrap();
        assert!(Onyphe::to_page(last).unwrap().next.is_none());
    }

    #[test]
    fn test_api_error_surfaces() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"error": 3, "text": "Invalid API key"}"#).unwrap();
        assert!(matches!(Onyphe::to_page(response), Err(SourceError::Parse(_))));
    }
}
