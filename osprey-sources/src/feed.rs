//! Indicator feed analyzer
//!
//! Fetches the URL given as the query. A JSON array body is taken element by
//! element; any other body is read as one indicator per line, skipping blank
//! lines and `#` comments.

use async_trait::async_trait;
use osprey_core::RawMatch;
use osprey_net::{send_checked, Cursor, NetError, Page};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::{Analyzer, SourceError};

pub struct Feed {
    client: Client,
}

impl Feed {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn parse(body: &str) -> Result<Vec<Option<RawMatch>>, SourceError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('[') {
            let values: Vec<Value> =
                serde_json::from_str(trimmed).map_err(|e| SourceError::Parse(e.to_string()))?;
            return values
                .into_iter()
                .map(|v| RawMatch::from_value(v).map_err(SourceError::from))
                .collect();
        }

        Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| Some(RawMatch::from(l)))
            .collect())
    }
}

#[async_trait]
impl Analyzer for Feed {
    fn name(&self) -> &str {
        "feed"
    }

    async fn fetch(
        &self,
        query: &str,
        _cursor: Option<Cursor>,
    ) -> Result<Page<Option<RawMatch>>, SourceError> {
        debug!("Fetching feed {}", query);
        let response = send_checked(self.client.get(query)).await?;
        let body = response.text().await.map_err(NetError::from)?;
        Ok(Page::last(Self::parse(&body)?))
    }
}
