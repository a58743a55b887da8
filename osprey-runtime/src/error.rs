use osprey_net::RetryError;
use osprey_sources::SourceError;
use thiserror::Error;

use crate::{RunState, StoreError};

/// Errors that fail a rule run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Analyzer {analyzer} failed: {error}")]
    Analyzer {
        analyzer: String,
        #[source]
        error: RetryError<SourceError>,
    },

    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("History store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Illegal run state transition {from:?} -> {to:?}")]
    IllegalTransition { from: RunState, to: RunState },
}
