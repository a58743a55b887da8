//! Osprey Runtime
//!
//! Turns a rule into at most one alert:
//! - [`AnalyzerHarness`]: pagination, retry and normalization per query
//! - [`DedupEngine`]: decay-aware novelty against a [`HistoryStore`]
//! - [`EnrichmentDispatcher`]: concurrent, idempotent enrichment
//! - [`Pipeline`]: the orchestrator tying them together
//! - [`RuleLoader`]: rules by file path or stored id

pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod harness;
pub mod history;
pub mod pipeline;
pub mod rules;
pub mod sqlite;

#[cfg(test)]
mod testing;

pub use dedup::*;
pub use dispatch::*;
pub use error::*;
pub use harness::*;
pub use history::*;
pub use pipeline::*;
pub use rules::*;
pub use sqlite::*;
