//! Osprey Core - Domain model for rule-driven OSINT hunting
//!
//! This crate provides the foundational types:
//! - Artifacts with derived data types and attached enrichment
//! - Normalization of raw analyzer output into artifacts
//! - Enrichment records and the enricher dispatch table
//! - Rules, query options and alerts

pub mod alert;
pub mod artifacts;
pub mod config;
pub mod data_type;
pub mod enrichment;
pub mod error;
pub mod rule;

pub use alert::*;
pub use artifacts::*;
pub use config::*;
pub use data_type::*;
pub use enrichment::*;
pub use error::*;
pub use rule::*;

/// Default attempts per request (including the first)
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Default seconds between attempts
pub const DEFAULT_RETRY_INTERVAL: u64 = 5;

/// Exponential backoff is on unless disabled
pub const DEFAULT_RETRY_EXPONENTIAL_BACKOFF: bool = true;

/// Default maximum pages per query
pub const DEFAULT_PAGINATION_LIMIT: u32 = 100;

/// Default seconds between page requests
pub const DEFAULT_PAGINATION_INTERVAL: u64 = 0;

pub const DEFAULT_IGNORE_ERROR: bool = false;
