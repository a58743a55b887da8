//! Enrichment dispatcher
//!
//! For each artifact, every enricher kind selected by the rule is matched
//! against the static enrichment table. Enrichments that apply to the
//! artifact's data type and are not yet attached run concurrently; artifacts
//! are processed concurrently up to a bounded width.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use osprey_core::{Artifact, Enrichment};
use osprey_sources::Enricher;
use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome counts of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    /// Lookups issued
    pub attempted: usize,
    /// Records attached
    pub attached: usize,
    /// Lookups that found nothing
    pub empty: usize,
    /// Lookups that failed; the field stays absent
    pub failed: usize,
}

impl AddAssign for EnrichmentReport {
    fn add_assign(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.attached += other.attached;
        self.empty += other.empty;
        self.failed += other.failed;
    }
}

/// One planned lookup
struct Job {
    enricher: Arc<dyn Enricher>,
    enrichment: Enrichment,
    key: String,
}

pub struct EnrichmentDispatcher {
    enrichers: Vec<Arc<dyn Enricher>>,
    concurrency: usize,
}

impl EnrichmentDispatcher {
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>, concurrency: usize) -> Self {
        Self {
            enrichers,
            concurrency: concurrency.max(1),
        }
    }

    /// Applicable, still-missing enrichments for an artifact
    fn plan(&self, artifact: &Artifact) -> Vec<Job> {
        let mut planned: HashSet<Enrichment> = HashSet::new();
        let mut jobs = Vec::new();

        for enricher in &self.enrichers {
            for &enrichment in enricher.kind().enrichments() {
                if !artifact.can_enrich(enrichment) || !planned.insert(enrichment) {
                    continue;
                }
                let Some(key) = artifact.enrichment_key(enrichment) else {
                    continue;
                };
                jobs.push(Job {
                    enricher: enricher.clone(),
                    enrichment,
                    key,
                });
            }
        }
        jobs
    }

    /// Enrich one artifact in place
    pub async fn enrich(&self, artifact: &mut Artifact) -> EnrichmentReport {
        let jobs = self.plan(artifact);
        let mut report = EnrichmentReport {
            attempted: jobs.len(),
            ..Default::default()
        };
        if jobs.is_empty() {
            return report;
        }

        let results = join_all(jobs.iter().map(|job| async move {
            (job, job.enricher.lookup(job.enrichment, &job.key).await)
        }))
        .await;

        for (job, result) in results {
            match result {
                Ok(Some(record)) if record.kind() == job.enrichment && !record.is_empty() => {
                    artifact.attach(record);
                    report.attached += 1;
                }
                Ok(Some(record)) if record.kind() != job.enrichment => {
                    warn!(
                        "{} returned {} for a {} lookup of {}",
                        job.enricher.kind(),
                        record.kind(),
                        job.enrichment,
                        job.key
                    );
                    report.failed += 1;
                }
                Ok(_) => {
                    debug!("{} has no {} for {}", job.enricher.kind(), job.enrichment, job.key);
                    report.empty += 1;
                }
                Err(e) => {
                    warn!(
                        "{} enrichment of {} failed: {}",
                        job.enrichment, artifact.data, e
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Enrich a batch, waiting for every artifact including failed ones
    pub async fn enrich_all(&self, artifacts: &mut [Artifact]) -> EnrichmentReport {
        let reports: Vec<EnrichmentReport> = stream::iter(artifacts.iter_mut())
            .map(|artifact| self.enrich(artifact))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut total = EnrichmentReport::default();
        for report in reports {
            total += report;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEnricher;
    use osprey_core::{EnricherKind, Port};

    fn dispatcher(enrichers: Vec<MockEnricher>) -> (EnrichmentDispatcher, Vec<Arc<MockEnricher>>) {
        let shared: Vec<Arc<MockEnricher>> = enrichers.into_iter().map(Arc::new).collect();
        let dyn_enrichers = shared
            .iter()
            .map(|e| e.clone() as Arc<dyn Enricher>)
            .collect();
        (EnrichmentDispatcher::new(dyn_enrichers, 4), shared)
    }

    #[tokio::test]
    async fn test_applicability_by_data_type() {
        let (dispatcher, mocks) = dispatcher(vec![
            MockEnricher::new(EnricherKind::Whois),
            MockEnricher::new(EnricherKind::Shodan),
        ]);

        let mut domain = Artifact::new("evil.example.com");
        let mut ip = Artifact::new("1.2.3.4");
        let mut hash = Artifact::new("d41d8cd98f00b204e9800998ecf8427e");

        dispatcher.enrich(&mut domain).await;
        dispatcher.enrich(&mut ip).await;
        let report = dispatcher.enrich(&mut hash).await;

        assert!(domain.whois_record.is_some());
        assert!(domain.ports.is_empty());
        assert!(ip.whois_record.is_none());
        assert_eq!(ip.ports, vec![Port { port: 443 }]);
        assert_eq!(report, EnrichmentReport::default());
        assert_eq!(mocks[0].calls(), 1);
        assert_eq!(mocks[1].calls(), 3);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let (dispatcher, mocks) = dispatcher(vec![
            MockEnricher::new(EnricherKind::IpInfo),
            MockEnricher::new(EnricherKind::Shodan),
        ]);

        let mut ip = Artifact::new("8.8.8.8");
        let first = dispatcher.enrich(&mut ip).await;
        let snapshot = ip.clone();
        let calls_after_first: usize = mocks.iter().map(|m| m.calls()).sum();

        let second = dispatcher.enrich(&mut ip).await;

        assert_eq!(first.attached, 5);
        assert_eq!(second, EnrichmentReport::default());
        assert_eq!(ip, snapshot);
        assert_eq!(mocks.iter().map(|m| m.calls()).sum::<usize>(), calls_after_first);
    }

    #[tokio::test]
    async fn test_one_failing_kind_is_isolated() {
        let (dispatcher, _) = dispatcher(vec![
            MockEnricher::new(EnricherKind::IpInfo),
            MockEnricher::new(EnricherKind::Shodan).failing_for("2.2.2.2"),
        ]);

        let mut batch = vec![
            Artifact::new("1.1.1.1"),
            Artifact::new("2.2.2.2"),
            Artifact::new("3.3.3.3"),
        ];
        let report = dispatcher.enrich_all(&mut batch).await;

        assert_eq!(report.failed, 3);
        assert!(batch[1].ports.is_empty());
        assert!(batch[1].autonomous_system.is_some());
        for artifact in [&batch[0], &batch[2]] {
            assert!(artifact.autonomous_system.is_some());
            assert!(artifact.geolocation.is_some());
            assert!(!artifact.ports.is_empty());
            assert!(!artifact.cpes.is_empty());
            assert!(!artifact.reverse_dns_names.is_empty());
        }
    }

    #[tokio::test]
    async fn test_existing_records_are_kept() {
        let (dispatcher, mocks) = dispatcher(vec![MockEnricher::new(EnricherKind::Shodan)]);

        let mut ip = Artifact::new("1.2.3.4");
        ip.ports = vec![Port { port: 22 }];
        dispatcher.enrich(&mut ip).await;

        assert_eq!(ip.ports, vec![Port { port: 22 }]);
        // cpes and reverse dns only
        assert_eq!(mocks[0].calls(), 2);
    }
}
