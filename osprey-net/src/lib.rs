//! Osprey network layer
//!
//! Shared plumbing for every upstream call:
//! - HTTP client construction (optional SOCKS/HTTP proxy)
//! - Retry with fixed or exponential backoff
//! - Cursor and page-number pagination

pub mod client;
pub mod paginate;
pub mod retry;

pub use client::*;
pub use paginate::*;
pub use retry::*;
