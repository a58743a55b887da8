//! Collaborator contracts for analyzers, enrichers and emitters

use async_trait::async_trait;
use osprey_core::{Alert, CoreError, EnricherKind, Enrichment, EnrichmentRecord, RawMatch};
use osprey_net::{Cursor, NetError, Page, Retryable};
use thiserror::Error;

/// Errors from source operations
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Payload(#[from] CoreError),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown {kind}: {name}")]
    Unknown { kind: &'static str, name: String },

    #[error("{enricher} cannot produce {enrichment}")]
    Unsupported {
        enricher: EnricherKind,
        enrichment: Enrichment,
    },
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::Net(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Queries one external data source for rule matches
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name stamped on every artifact this analyzer produces
    fn name(&self) -> &str;

    /// Fetch one page of raw matches
    ///
    /// `cursor` is `None` for the first page.
    async fn fetch(
        &self,
        query: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Option<RawMatch>>, SourceError>;
}

/// Attaches auxiliary intelligence keyed by domain or IP
#[async_trait]
pub trait Enricher: Send + Sync {
    fn kind(&self) -> EnricherKind;

    /// `Ok(None)` when the upstream has nothing for `key`
    async fn lookup(
        &self,
        enrichment: Enrichment,
        key: &str,
    ) -> Result<Option<EnrichmentRecord>, SourceError>;
}

/// Delivers an alert downstream
#[async_trait]
pub trait Emitter: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, alert: &Alert) -> Result<(), SourceError>;
}
