//! Provider registry.
//!
//! Maps provider tags (e.g. "jina", "firecrawl") to [`ProviderService`]
//! implementations. The processor resolves a job's provider once per attempt,
//! so the set of providers stays open for extension without the core knowing
//! any concrete type.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ProviderRegistry::new();
//! registry.register("jina", Arc::new(JinaProvider::new(credentials)));
//! registry.register("firecrawl", Arc::new(FirecrawlProvider::from_env()?));
//!
//! let service = registry.get_service_for_config(&job.config)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::ProviderService;
use crate::error::{QueueError, Result};
use crate::jobs::JobConfig;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderService>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under `tag`, replacing any previous registration.
    ///
    /// Tags are matched case-insensitively, ignoring surrounding whitespace.
    pub fn register(&mut self, tag: impl AsRef<str>, service: Arc<dyn ProviderService>) {
        let tag = normalize(tag.as_ref());
        debug!(provider = %tag, "registered provider");
        self.providers.insert(tag, service);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_provider(mut self, tag: impl AsRef<str>, service: Arc<dyn ProviderService>) -> Self {
        self.register(tag, service);
        self
    }

    /// Resolve the provider for a job.
    pub fn get_service_for_config(&self, config: &JobConfig) -> Result<Arc<dyn ProviderService>> {
        self.get(&config.provider)
            .ok_or_else(|| QueueError::UnknownProvider {
                provider: config.provider.clone(),
            })
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn ProviderService>> {
        self.providers.get(&normalize(tag)).cloned()
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.providers.contains_key(&normalize(tag))
    }

    pub fn registered_providers(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.providers.keys().cloned().collect();
        tags.sort();
        tags
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    fn config(provider: &str) -> JobConfig {
        JobConfig::builder()
            .name("docs")
            .url("https://example.com")
            .provider(provider)
            .build()
    }

    #[test]
    fn register_and_resolve() {
        let registry = ProviderRegistry::new().with_provider("Jina", Arc::new(MockProvider::new()));

        assert!(registry.is_registered("jina"));
        assert!(registry.is_registered(" JINA "));
        assert!(registry.get_service_for_config(&config("jina")).is_ok());
        assert_eq!(registry.registered_providers(), vec!["jina".to_string()]);
    }

    #[test]
    fn unknown_provider_is_reported() {
        let registry = ProviderRegistry::new();
        match registry.get_service_for_config(&config("firecrawl")) {
            Err(QueueError::UnknownProvider { provider }) => assert_eq!(provider, "firecrawl"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected unknown provider"),
        }
    }
}
