//! Analyzer harness
//!
//! Drives one analyzer query through pagination and retry, then normalizes
//! the raw output. Each invocation carries a [`RunTracker`] that only accepts
//! legal state transitions:
//!
//! ```text
//! Idle → Fetching ⇄ Retrying
//! Fetching → Normalizing → Deduping → Enriching → Complete
//! Fetching | Retrying → Failed
//! ```

use osprey_core::{normalize, Artifact, Defaults, EffectiveOptions, QueryBinding};
use osprey_net::{collect_pages, retry_on_error, PaginationPolicy, RetryPolicy};
use osprey_sources::Analyzer;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Retrying,
    Normalizing,
    Deduping,
    Enriching,
    Complete,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Fetching)
                | (Fetching, Retrying)
                | (Retrying, Fetching)
                | (Fetching, Normalizing)
                | (Normalizing, Deduping)
                | (Deduping, Enriching)
                | (Enriching, Complete)
                | (Fetching, Failed)
                | (Retrying, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }
}

/// State of one analyzer invocation with its transition history
pub struct RunTracker {
    analyzer: String,
    history: Mutex<Vec<RunState>>,
}

impl RunTracker {
    pub fn new(analyzer: &str) -> Self {
        Self {
            analyzer: analyzer.to_string(),
            history: Mutex::new(vec![RunState::Idle]),
        }
    }

    pub fn state(&self) -> RunState {
        self.history
            .lock()
            .last()
            .copied()
            .unwrap_or(RunState::Idle)
    }

    /// Every state visited so far, starting with `Idle`
    pub fn history(&self) -> Vec<RunState> {
        self.history.lock().clone()
    }

    pub fn advance(&self, next: RunState) -> Result<(), PipelineError> {
        let mut history = self.history.lock();
        let current = history.last().copied().unwrap_or(RunState::Idle);
        if !current.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: current,
                to: next,
            });
        }
        if current != next {
            debug!("{}: {:?} -> {:?}", self.analyzer, current, next);
            history.push(next);
        }
        Ok(())
    }

    /// Record a retry: the failed fetch waits, then fetches again
    fn retry(&self) {
        let mut history = self.history.lock();
        if history.last() == Some(&RunState::Fetching) {
            history.push(RunState::Retrying);
            history.push(RunState::Fetching);
        }
    }
}

/// Runs one query binding of a rule
pub struct AnalyzerHarness {
    analyzer: Arc<dyn Analyzer>,
    query: String,
    options: EffectiveOptions,
    retry: RetryPolicy,
    pagination: PaginationPolicy,
    tracker: RunTracker,
}

impl AnalyzerHarness {
    pub fn new(analyzer: Arc<dyn Analyzer>, binding: &QueryBinding, defaults: &Defaults) -> Self {
        let tracker = RunTracker::new(analyzer.name());
        let options = binding.options.resolve(defaults);
        Self {
            analyzer,
            query: binding.query.clone(),
            retry: RetryPolicy::from(&options),
            pagination: PaginationPolicy::from(&options),
            options,
            tracker,
        }
    }

    /// Replace the retry policy derived from the query options
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        self.analyzer.name()
    }

    pub fn options(&self) -> &EffectiveOptions {
        &self.options
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch every page and normalize the result
    ///
    /// With the retry policy's `ignore_error` set, a failed fetch yields no
    /// artifacts instead of an error.
    pub async fn run(&self) -> Result<Vec<Artifact>, PipelineError> {
        self.tracker.advance(RunState::Fetching)?;

        let retry = &self.retry;
        let tracker = &self.tracker;
        let analyzer = &self.analyzer;
        let query = self.query.as_str();

        // Every page gets its own retry budget
        let fetched = collect_pages(&self.pagination, |cursor| async move {
            retry_on_error(retry, |attempt| {
                if attempt > 0 {
                    tracker.retry();
                }
                analyzer.fetch(query, cursor.clone())
            })
            .await
        })
        .await;

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) if self.retry.ignore_error => {
                if e.is_exhausted() {
                    warn!("{} gave up retrying, continuing without it: {}", self.name(), e);
                } else {
                    warn!("{} failed, continuing without it: {}", self.name(), e);
                }
                Vec::new()
            }
            Err(e) => {
                self.tracker.advance(RunState::Failed)?;
                return Err(PipelineError::Analyzer {
                    analyzer: self.name().to_string(),
                    error: e,
                });
            }
        };

        self.tracker.advance(RunState::Normalizing)?;
        let artifacts = normalize(raw, self.name());
        info!("{} returned {} artifacts", self.name(), artifacts.len());
        Ok(artifacts)
    }
}
