//! Bounded retry with fixed or exponential backoff
//!
//! [`retry_on_error`] re-invokes a fallible async operation while its error
//! reports itself as [`Retryable`]. The policy is an explicit value built from
//! a query's effective options.

use osprey_core::EffectiveOptions;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Classifies an error as transient
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry behavior for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub times: u32,
    /// Base wait between attempts
    pub interval: Duration,
    /// Double the wait after every failed attempt
    pub exponential_backoff: bool,
    /// Callers degrade a failed operation to an empty result instead of an error
    pub ignore_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EffectiveOptions::default())
    }
}

impl From<&EffectiveOptions> for RetryPolicy {
    fn from(options: &EffectiveOptions) -> Self {
        Self {
            times: options.retry_times,
            interval: Duration::from_secs(options.retry_interval),
            exponential_backoff: options.retry_exponential_backoff,
            ignore_error: options.ignore_error,
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt with 0-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt);
            self.interval.saturating_mul(factor)
        } else {
            self.interval
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was not retryable
    #[error("{0}")]
    Fatal(E),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `f` until it succeeds, fails fatally, or the budget is spent
///
/// `f` receives the 0-based attempt index. No wait follows the last attempt.
pub async fn retry_on_error<T, E, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let times = policy.times.max(1);
    let mut attempt = 0;

    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                debug!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                return Err(RetryError::Fatal(e));
            }
            Err(e) => {
                if attempt + 1 >= times {
                    warn!("Giving up after {} attempts: {}", times, e);
                    return Err(RetryError::Exhausted {
                        attempts: times,
                        last: e,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt + 1,
                    times,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn policy(times: u32, exponential_backoff: bool) -> RetryPolicy {
        RetryPolicy {
            times,
            interval: Duration::from_secs(5),
            exponential_backoff,
            ignore_error: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result = retry_on_error(&policy(3, false), |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_doubles_wait() {
        let start = Instant::now();
        let result: Result<(), _> =
            retry_on_error(&policy(3, true), |_| async { Err(Flaky(true)) }).await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        match err {
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // 5s after the first failure, 10s after the second, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result: Result<(), _> = retry_on_error(&policy(5, true), |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert!(!result.unwrap_err().is_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_times_still_attempts_once() {
        let result = retry_on_error(&policy(0, false), |attempt| async move {
            Ok::<u32, Flaky>(attempt)
        })
        .await;
        assert_eq!(result.unwrap(), 0);
    }

    #[test]
    fn test_policy_from_options() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.times, 3);
        assert_eq!(retry.interval, Duration::from_secs(5));
        assert!(retry.exponential_backoff);
        assert_eq!(retry.delay_for(0), Duration::from_secs(5));
        assert_eq!(retry.delay_for(2), Duration::from_secs(20));
    }
}
