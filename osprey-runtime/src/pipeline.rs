//! Pipeline orchestrator
//!
//! Runs a rule to completion:
//! 1. Each query binding runs through its [`AnalyzerHarness`], one after another
//! 2. Results merge, pass the rule's filters and collapse by payload
//! 3. The dedup engine claims the new artifacts
//! 4. Survivors are enriched concurrently
//! 5. A non-empty survivor set becomes an [`Alert`], persisted and handed to
//!    every emitter concurrently

use chrono::{DateTime, Utc};
use futures::future::join_all;
use osprey_core::{Alert, Artifact, Defaults, Rule};
use osprey_sources::{Emitter, SourceProvider};
use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    AnalyzerHarness, DedupEngine, EnrichmentDispatcher, HistoryStore, PipelineError, RunState,
};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Artifacts enriched at the same time
    pub enrichment_concurrency: usize,
    /// Query option defaults
    pub defaults: Defaults,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment_concurrency: env::var("OSPREY_ENRICHMENT_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            defaults: Defaults::from_env(),
        }
    }
}

impl PipelineConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.enrichment_concurrency = concurrency;
        self
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    sources: Arc<dyn SourceProvider>,
    history: Arc<dyn HistoryStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        sources: Arc<dyn SourceProvider>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            sources,
            history,
        }
    }

    /// Run a rule now
    ///
    /// `Ok(None)` means the run found nothing new.
    pub async fn run(&self, rule: &Rule) -> Result<Option<Alert>, PipelineError> {
        self.run_at(rule, Utc::now()).await
    }

    /// Run a rule with dedup decisions pinned to `base_time`
    pub async fn run_at(
        &self,
        rule: &Rule,
        base_time: DateTime<Utc>,
    ) -> Result<Option<Alert>, PipelineError> {
        info!("Running rule {} ({} queries)", rule.id, rule.queries.len());

        // Resolve every collaborator before anything is recorded
        let harnesses = rule
            .queries
            .iter()
            .map(|binding| -> Result<AnalyzerHarness, PipelineError> {
                let analyzer = self.sources.analyzer(binding)?;
                Ok(AnalyzerHarness::new(analyzer, binding, &self.config.defaults))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let emitters = self.sources.emitters(rule)?;

        let mut merged = Vec::new();
        for (i, harness) in harnesses.iter().enumerate() {
            merged.extend(harness.run().await?);

            let interval = harness.options().interval;
            if interval > 0 && i + 1 < harnesses.len() {
                debug!("Waiting {}s before the next query", interval);
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }

        let candidates = filter_candidates(rule, merged, base_time);

        advance_all(&harnesses, RunState::Deduping)?;
        // Store calls block, so they run off the async workers
        let dedup = DedupEngine::new(self.history.clone());
        let rule_id = rule.id.clone();
        let lifetime = rule.artifact_lifetime;
        let mut unique = task::spawn_blocking(move || {
            dedup.claim(candidates, &rule_id, lifetime, base_time)
        })
        .await??;

        advance_all(&harnesses, RunState::Enriching)?;
        let dispatcher = EnrichmentDispatcher::new(
            self.sources.enrichers(rule),
            self.config.enrichment_concurrency,
        );
        let report = dispatcher.enrich_all(&mut unique).await;
        if report.failed > 0 {
            warn!(
                "Rule {}: {} of {} enrichment lookups failed",
                rule.id, report.failed, report.attempted
            );
        }
        advance_all(&harnesses, RunState::Complete)?;

        let Some(alert) = Alert::from_rule(rule, unique, base_time) else {
            info!("Rule {}: no new findings", rule.id);
            return Ok(None);
        };

        let history = self.history.clone();
        let stored = alert.clone();
        task::spawn_blocking(move || history.persist(&stored)).await??;
        info!(
            "Rule {}: alert {} with {} artifacts",
            rule.id,
            alert.id,
            alert.artifact_count()
        );

        let failures = emit_all(&alert, &emitters).await;
        if failures > 0 {
            warn!("Rule {}: {} of {} emitters failed", rule.id, failures, emitters.len());
        }
        Ok(Some(alert))
    }
}

/// Rule filters plus cross-analyzer collapse by payload
fn filter_candidates(rule: &Rule, merged: Vec<Artifact>, base_time: DateTime<Utc>) -> Vec<Artifact> {
    let mut seen = HashSet::new();
    merged
        .into_iter()
        .filter(|a| {
            let admitted = rule.admits(a);
            if !admitted {
                debug!("Rule {} excludes {}", rule.id, a.data);
            }
            admitted
        })
        .filter(|a| seen.insert(a.data.clone()))
        .map(|a| a.with_rule_id(&rule.id).with_created_at(base_time))
        .collect()
}

fn advance_all(harnesses: &[AnalyzerHarness], next: RunState) -> Result<(), PipelineError> {
    harnesses.iter().try_for_each(|h| h.tracker().advance(next))
}

/// Deliver to every emitter; failures are logged and do not fail the run
async fn emit_all(alert: &Alert, emitters: &[Arc<dyn Emitter>]) -> usize {
    let results = join_all(emitters.iter().map(|emitter| async move {
        (emitter.name().to_string(), emitter.emit(alert).await)
    }))
    .await;

    let mut failures = 0;
    for (name, result) in results {
        match result {
            Ok(()) => debug!("Emitter {} delivered alert {}", name, alert.id),
            Err(e) => {
                warn!("Emitter {} failed: {}", name, e);
                failures += 1;
            }
        }
    }
    failures
}
