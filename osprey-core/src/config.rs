//! Query option defaults
//!
//! Every query binding may override retry and pagination behavior. Options it
//! leaves unset fall back to [`Defaults`], which read `OSPREY_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::{
    DEFAULT_IGNORE_ERROR, DEFAULT_PAGINATION_INTERVAL, DEFAULT_PAGINATION_LIMIT,
    DEFAULT_RETRY_EXPONENTIAL_BACKOFF, DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_TIMES,
};

/// Process-wide defaults for query options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub retry_times: u32,
    /// Seconds between attempts
    pub retry_interval: u64,
    pub retry_exponential_backoff: bool,
    pub pagination_limit: u32,
    /// Seconds between page requests
    pub pagination_interval: u64,
    pub ignore_error: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retry_times: DEFAULT_RETRY_TIMES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            retry_exponential_backoff: DEFAULT_RETRY_EXPONENTIAL_BACKOFF,
            pagination_limit: DEFAULT_PAGINATION_LIMIT,
            pagination_interval: DEFAULT_PAGINATION_INTERVAL,
            ignore_error: DEFAULT_IGNORE_ERROR,
        }
    }
}

impl Defaults {
    /// Built-in defaults overridden by any parseable `OSPREY_*` variable
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            retry_times: env_or("OSPREY_RETRY_TIMES", base.retry_times),
            retry_interval: env_or("OSPREY_RETRY_INTERVAL", base.retry_interval),
            retry_exponential_backoff: env_or(
                "OSPREY_RETRY_EXPONENTIAL_BACKOFF",
                base.retry_exponential_backoff,
            ),
            pagination_limit: env_or("OSPREY_PAGINATION_LIMIT", base.pagination_limit),
            pagination_interval: env_or("OSPREY_PAGINATION_INTERVAL", base.pagination_interval),
            ignore_error: env_or("OSPREY_IGNORE_ERROR", base.ignore_error),
        }
    }
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Per-query overrides as written in a rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    /// Seconds to wait after this query before running the next one
    pub interval: Option<u64>,
    pub retry_times: Option<u32>,
    pub retry_interval: Option<u64>,
    pub retry_exponential_backoff: Option<bool>,
    pub pagination_limit: Option<u32>,
    pub pagination_interval: Option<u64>,
    pub ignore_error: Option<bool>,
    /// Per-request HTTP timeout in seconds
    pub timeout: Option<u64>,
}

impl QueryOptions {
    pub fn resolve(&self, defaults: &Defaults) -> EffectiveOptions {
        EffectiveOptions {
            interval: self.interval.unwrap_or(0),
            retry_times: self.retry_times.unwrap_or(defaults.retry_times),
            retry_interval: self.retry_interval.unwrap_or(defaults.retry_interval),
            retry_exponential_backoff: self
                .retry_exponential_backoff
                .unwrap_or(defaults.retry_exponential_backoff),
            pagination_limit: self.pagination_limit.unwrap_or(defaults.pagination_limit),
            pagination_interval: self.pagination_interval.unwrap_or(defaults.pagination_interval),
            ignore_error: self.ignore_error.unwrap_or(defaults.ignore_error),
            timeout: self.timeout,
        }
    }
}

/// Query options with every default filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub interval: u64,
    pub retry_times: u32,
    pub retry_interval: u64,
    pub retry_exponential_backoff: bool,
    pub pagination_limit: u32,
    pub pagination_interval: u64,
    pub ignore_error: bool,
    pub timeout: Option<u64>,
}

impl Default for EffectiveOptions {
    fn default() -> Self {
        QueryOptions::default().resolve(&Defaults::default())
    }
}
