//! Provider registry — builds and owns every configured provider instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mgx_domain::config::{LlmConfig, ProviderKind};
use mgx_domain::Result;

use crate::openai_compat::OpenAiCompatProvider;
use crate::scripted::ScriptedProvider;
use crate::traits::LlmProvider;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
    summarizer_id: Option<String>,
}

impl ProviderRegistry {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.request_timeout_sec);
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for (id, provider_cfg) in &cfg.providers {
            let provider: Arc<dyn LlmProvider> = match provider_cfg.kind {
                ProviderKind::OpenaiCompat => {
                    Arc::new(OpenAiCompatProvider::from_config(id, provider_cfg, timeout)?)
                }
                ProviderKind::Scripted => Arc::new(ScriptedProvider::empty()),
            };
            tracing::info!(provider_id = %id, kind = ?provider_cfg.kind, "LLM provider registered");
            providers.insert(id.clone(), provider);
        }

        Ok(Self {
            providers,
            default_id: cfg.default_provider.clone(),
            summarizer_id: cfg.summarizer.clone(),
        })
    }

    /// Registry with a single pre-built provider (tests wire the scripted
    /// provider through here).
    pub fn single(id: &str, provider: Arc<dyn LlmProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(id.to_owned(), provider);
        Self {
            providers,
            default_id: Some(id.to_owned()),
            summarizer_id: None,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(id).cloned()
    }

    /// The default provider: the configured one, else any registered.
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        if let Some(id) = &self.default_id {
            if let Some(p) = self.get(id) {
                return Some(p);
            }
        }
        self.providers.values().next().cloned()
    }

    /// The provider used for compression summaries; falls back to the
    /// default provider.
    pub fn summarizer(&self) -> Option<Arc<dyn LlmProvider>> {
        self.summarizer_id
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.default_provider())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_domain::config::ProviderConfig;

    fn scripted_cfg() -> LlmConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "canned".to_string(),
            ProviderConfig {
                kind: ProviderKind::Scripted,
                base_url: None,
                api_key_env: None,
                model: None,
            },
        );
        LlmConfig {
            providers,
            default_provider: Some("canned".into()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn builds_scripted_provider_from_config() {
        let registry = ProviderRegistry::from_config(&scripted_cfg()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("canned").is_some());
        assert!(registry.default_provider().is_some());
    }

    #[test]
    fn summarizer_falls_back_to_default() {
        let registry = ProviderRegistry::from_config(&scripted_cfg()).unwrap();
        assert!(registry.summarizer().is_some());
    }

    #[test]
    fn empty_config_yields_empty_registry() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.default_provider().is_none());
    }
}
