//! Webhook emitter: POSTs the alert as JSON

use async_trait::async_trait;
use osprey_core::Alert;
use osprey_net::send_checked;
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{Emitter, SourceError};

pub struct WebhookEmitter {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
}

impl WebhookEmitter {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl Emitter for WebhookEmitter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn emit(&self, alert: &Alert) -> Result<(), SourceError> {
        let mut request = self.client.post(&self.url).json(alert);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        send_checked(request).await?;
        debug!("Delivered alert {} to {}", alert.id, self.url);
        Ok(())
    }
}
