//! In-process collaborators for runtime tests

use async_trait::async_trait;
use osprey_core::{
    Alert, AutonomousSystem, Cpe, DnsRecord, EnricherKind, Enrichment, EnrichmentRecord,
    Geolocation, Port, QueryBinding, RawMatch, ReverseDnsName, Rule, WhoisRecord,
};
use osprey_net::{Cursor, NetError, Page};
use osprey_sources::{Analyzer, Emitter, Enricher, SourceError, SourceProvider};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn transient() -> SourceError {
    SourceError::Net(NetError::Status {
        status: 503,
        url: "https://upstream.example.net".to_string(),
    })
}

/// Serves fixed pages, failing the first `failures` calls with a 503
pub struct MockAnalyzer {
    name: String,
    pages: Vec<Vec<Value>>,
    failures: AtomicUsize,
    always_fail: bool,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new(name: &str, items: Vec<Value>) -> Self {
        Self::paged(name, vec![items])
    }

    pub fn paged(name: &str, pages: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.to_string(),
            pages,
            failures: AtomicUsize::new(0),
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            always_fail: true,
            ..Self::paged(name, vec![])
        }
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        _query: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Option<RawMatch>>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(transient());
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(transient());
        }

        let index = match cursor {
            Some(Cursor::Page(n)) => n as usize - 1,
            _ => 0,
        };
        let items = self
            .pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(RawMatch::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        if index + 1 < self.pages.len() {
            Ok(Page::with_next(items, Cursor::Page(index as u32 + 2)))
        } else {
            Ok(Page::last(items))
        }
    }
}

/// Returns a fixed non-empty record for every enrichment of its kind
pub struct MockEnricher {
    kind: EnricherKind,
    failing_for: Option<String>,
    calls: AtomicUsize,
}

impl MockEnricher {
    pub fn new(kind: EnricherKind) -> Self {
        Self {
            kind,
            failing_for: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, key: &str) -> Self {
        self.failing_for = Some(key.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    async fn lookup(
        &self,
        enrichment: Enrichment,
        key: &str,
    ) -> Result<Option<EnrichmentRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.failing_for.as_deref() == Some(key) {
            return Err(transient());
        }

        let record = match enrichment {
            Enrichment::AutonomousSystem => {
                EnrichmentRecord::AutonomousSystem(AutonomousSystem { asn: 13335 })
            }
            Enrichment::Geolocation => EnrichmentRecord::Geolocation(Geolocation {
                country: "United States".to_string(),
                country_code: "US".to_string(),
            }),
            Enrichment::Whois => EnrichmentRecord::Whois(WhoisRecord {
                domain: key.to_string(),
                registrar: Some("Example Registrar".to_string()),
                created_on: None,
                updated_on: None,
                expires_on: None,
                contacts: vec![],
            }),
            Enrichment::Dns => EnrichmentRecord::Dns(vec![DnsRecord {
                resource: "A".to_string(),
                value: "93.184.215.14".to_string(),
            }]),
            Enrichment::ReverseDns => EnrichmentRecord::ReverseDns(vec![ReverseDnsName {
                name: format!("host.{}.example", key),
            }]),
            Enrichment::Ports => EnrichmentRecord::Ports(vec![Port { port: 443 }]),
            Enrichment::Cpes => EnrichmentRecord::Cpes(vec![Cpe {
                name: "cpe:/a:nginx:nginx".to_string(),
            }]),
        };
        Ok(Some(record))
    }
}

/// Keeps every alert it receives
#[derive(Default)]
pub struct RecordingEmitter {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingEmitter {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl Emitter for RecordingEmitter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, alert: &Alert) -> Result<(), SourceError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

pub struct FailingEmitter;

#[async_trait]
impl Emitter for FailingEmitter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn emit(&self, _alert: &Alert) -> Result<(), SourceError> {
        Err(transient())
    }
}

/// Source provider over fixed instances, analyzers looked up by name
#[derive(Default)]
pub struct MockProvider {
    pub analyzers: HashMap<String, Arc<MockAnalyzer>>,
    pub enrichers: Vec<Arc<MockEnricher>>,
    pub emitters: Vec<Arc<dyn Emitter>>,
}

impl MockProvider {
    pub fn with_analyzer(mut self, analyzer: MockAnalyzer) -> Self {
        self.analyzers
            .insert(analyzer.name.clone(), Arc::new(analyzer));
        self
    }

    pub fn with_enricher(mut self, enricher: MockEnricher) -> Self {
        self.enrichers.push(Arc::new(enricher));
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitters.push(emitter);
        self
    }
}

impl SourceProvider for MockProvider {
    fn analyzer(&self, binding: &QueryBinding) -> Result<Arc<dyn Analyzer>, SourceError> {
        self.analyzers
            .get(&binding.analyzer)
            .map(|a| a.clone() as Arc<dyn Analyzer>)
            .ok_or_else(|| SourceError::Unknown {
                kind: "analyzer",
                name: binding.analyzer.clone(),
            })
    }

    fn enrichers(&self, rule: &Rule) -> Vec<Arc<dyn Enricher>> {
        self.enrichers
            .iter()
            .filter(|e| rule.enrichers.contains(&e.kind()))
            .map(|e| e.clone() as Arc<dyn Enricher>)
            .collect()
    }

    fn emitters(&self, _rule: &Rule) -> Result<Vec<Arc<dyn Emitter>>, SourceError> {
        Ok(self.emitters.clone())
    }
}
