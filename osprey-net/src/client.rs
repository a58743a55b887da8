//! HTTP client factory
//!
//! Builds the `reqwest` clients shared by analyzers, enrichers and emitters,
//! and classifies request failures for the retry harness.

use reqwest::{Client, Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::Retryable;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Optional proxy URL (http://, https:// or socks5h://)
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("osprey/{}", env!("CARGO_PKG_VERSION")),
            proxy: env::var("OSPREY_PROXY").ok().filter(|p| !p.is_empty()),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Errors from HTTP calls
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl Retryable for NetError {
    fn is_retryable(&self) -> bool {
        match self {
            NetError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NetError::Status { status, .. } => *status == 429 || *status >= 500,
            NetError::Timeout(_) => true,
            NetError::ClientBuild(_) | NetError::Decode(_) => false,
        }
    }
}

/// Create an HTTP client from configuration
pub fn create_client(config: &HttpConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str());

    if let Some(proxy) = &config.proxy {
        let proxy = Proxy::all(proxy).map_err(|e| NetError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}

/// Send a request, turning non-success statuses into [`NetError::Status`]
pub async fn send_checked(request: RequestBuilder) -> Result<Response, NetError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Send a request and decode a JSON body
pub async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, NetError> {
    let response = send_checked(request).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| NetError::Decode(e.to_string()))
}
