//! Source registry
//!
//! Resolves the analyzer, enricher and emitter names written in a rule into
//! live instances. Enrichers are built fresh for every call to
//! [`SourceProvider::enrichers`], so their memo caches live for one run.

use osprey_core::{EmitterBinding, EnricherKind, QueryBinding, Rule};
use osprey_net::{create_client, HttpConfig};
use reqwest::Client;
use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use crate::{
    Analyzer, ConsoleEmitter, Emitter, Enricher, Feed, GooglePublicDns, IpInfo, Onyphe, Shodan,
    SourceError, VirusTotalIntelligence, WebhookEmitter, Whois,
};

/// API keys and HTTP settings for all sources
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub virustotal_api_key: Option<String>,
    pub onyphe_api_key: Option<String>,
    /// Optional; raises the IPInfo rate limit
    pub ipinfo_api_key: Option<String>,
    pub http: HttpConfig,
}

fn env_key(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            virustotal_api_key: env_key("VIRUSTOTAL_API_KEY"),
            onyphe_api_key: env_key("ONYPHE_API_KEY"),
            ipinfo_api_key: env_key("IPINFO_API_KEY"),
            http: HttpConfig::default(),
        }
    }
}

/// Builds the collaborators a rule run needs
pub trait SourceProvider: Send + Sync {
    fn analyzer(&self, binding: &QueryBinding) -> Result<Arc<dyn Analyzer>, SourceError>;

    /// One instance per enricher selected by the rule
    fn enrichers(&self, rule: &Rule) -> Vec<Arc<dyn Enricher>>;

    fn emitters(&self, rule: &Rule) -> Result<Vec<Arc<dyn Emitter>>, SourceError>;
}

pub struct Registry {
    settings: SourceSettings,
    client: Client,
}

impl Registry {
    pub fn new(settings: SourceSettings) -> Result<Self, SourceError> {
        let client = create_client(&settings.http)?;
        Ok(Self { settings, client })
    }

    /// Check that every name in a rule resolves, without touching the network
    pub fn check(&self, rule: &Rule) -> Result<(), SourceError> {
        for binding in &rule.queries {
            self.analyzer(binding)?;
        }
        self.emitters(rule)?;
        Ok(())
    }

    fn client_for(&self, binding: &QueryBinding) -> Result<Client, SourceError> {
        match binding.options.timeout {
            Some(timeout) => Ok(create_client(&self.settings.http.clone().with_timeout(timeout))?),
            None => Ok(self.client.clone()),
        }
    }

    fn require(key: &Option<String>, name: &str) -> Result<String, SourceError> {
        key.clone()
            .ok_or_else(|| SourceError::NotConfigured(format!("{} is not set", name)))
    }

    fn emitter(&self, binding: &EmitterBinding) -> Result<Arc<dyn Emitter>, SourceError> {
        match binding.emitter.as_str() {
            "console" => Ok(Arc::new(ConsoleEmitter)),
            "webhook" => {
                let url = binding.url.clone().ok_or_else(|| {
                    SourceError::NotConfigured("webhook emitter needs a url".to_string())
                })?;
                Ok(Arc::new(
                    WebhookEmitter::new(self.client.clone(), url).with_headers(binding.headers.clone()),
                ))
            }
            other => Err(SourceError::Unknown {
                kind: "emitter",
                name: other.to_string(),
            }),
        }
    }
}

impl SourceProvider for Registry {
    fn analyzer(&self, binding: &QueryBinding) -> Result<Arc<dyn Analyzer>, SourceError> {
        match binding.analyzer.as_str() {
            "virustotal_intelligence" => {
                let key = Self::require(&self.settings.virustotal_api_key, "VIRUSTOTAL_API_KEY")?;
                Ok(Arc::new(VirusTotalIntelligence::new(self.client_for(binding)?, key)))
            }
            "onyphe" => {
                let key = Self::require(&self.settings.onyphe_api_key, "ONYPHE_API_KEY")?;
                Ok(Arc::new(Onyphe::new(self.client_for(binding)?, key)))
            }
            "feed" => Ok(Arc::new(Feed::new(self.client_for(binding)?))),
            other => Err(SourceError::Unknown {
                kind: "analyzer",
                name: other.to_string(),
            }),
        }
    }

    fn enrichers(&self, rule: &Rule) -> Vec<Arc<dyn Enricher>> {
        let mut seen = HashSet::new();

        rule.enrichers
            .iter()
            .copied()
            .filter(|kind| seen.insert(*kind))
            .map(|kind| -> Arc<dyn Enricher> {
                let client = self.client.clone();
                match kind {
                    EnricherKind::Whois => Arc::new(Whois::new(client)),
                    EnricherKind::IpInfo => {
                        Arc::new(IpInfo::new(client, self.settings.ipinfo_api_key.clone()))
                    }
                    EnricherKind::Shodan => Arc::new(Shodan::new(client)),
                    EnricherKind::GooglePublicDns => Arc::new(GooglePublicDns::new(client)),
                }
            })
            .collect()
    }

    fn emitters(&self, rule: &Rule) -> Result<Vec<Arc<dyn Emitter>>, SourceError> {
        rule.emitters.iter().map(|b| self.emitter(b)).collect()
    }
}
