//! Provider registry.
//!
//! Constructs and holds all configured upstream providers.  Several
//! providers (or tenants of the same provider) can live in one process;
//! each carries its own base URL and credentials.

use std::collections::HashMap;
use std::sync::Arc;

use cr_domain::config::{LlmConfig, ProviderKind};
use cr_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::CompletionProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    default_id: Option<String>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize (usually a missing API key) are
    /// logged and skipped rather than aborting startup.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            default_id: config.default_provider.clone(),
        };

        for pc in &config.providers {
            let result: Result<Arc<dyn CompletionProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered provider");
                    if registry.default_id.is_none() {
                        registry.default_id = Some(pc.id.clone());
                    }
                    registry.providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        error = %e,
                        "failed to initialize provider, skipping"
                    );
                }
            }
        }

        registry
    }

    /// An empty registry, filled with [`ProviderRegistry::insert`].
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            default_id: None,
        }
    }

    /// Register a provider under its own id.  The first one inserted
    /// becomes the default unless a default is already set.
    pub fn insert(&mut self, provider: Arc<dyn CompletionProvider>) {
        let id = provider.provider_id().to_owned();
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    /// Look up a provider by id, or the default when `id` is `None`.
    pub fn resolve(&self, id: Option<&str>) -> Result<Arc<dyn CompletionProvider>> {
        let id = id
            .or(self.default_id.as_deref())
            .ok_or_else(|| Error::Config("no completion provider configured".into()))?;
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("provider '{id}'")))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cr_domain::config::{AuthConfig, AuthMode, ProviderConfig};

    fn local(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "http://localhost:1234/v1".into(),
            auth: AuthConfig {
                mode: AuthMode::None,
                ..Default::default()
            },
            default_model: None,
            connect_timeout_ms: None,
        }
    }

    #[test]
    fn first_provider_is_default() {
        let cfg = LlmConfig {
            providers: vec![local("a"), local("b")],
            ..Default::default()
        };
        let reg = ProviderRegistry::from_config(&cfg);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.resolve(None).unwrap().provider_id(), "a");
        assert_eq!(reg.resolve(Some("b")).unwrap().provider_id(), "b");
    }

    #[test]
    fn provider_without_key_is_skipped() {
        let mut broken = local("broken");
        broken.auth = AuthConfig {
            env: Some("CR_TEST_REGISTRY_MISSING_KEY".into()),
            ..Default::default()
        };
        let cfg = LlmConfig {
            providers: vec![broken, local("ok")],
            ..Default::default()
        };
        let reg = ProviderRegistry::from_config(&cfg);
        assert_eq!(reg.len(), 1);
        assert!(matches!(reg.resolve(Some("broken")), Err(Error::NotFound(_))));
        assert_eq!(reg.resolve(None).unwrap().provider_id(), "ok");
    }

    #[test]
    fn empty_registry_has_no_default() {
        let reg = ProviderRegistry::empty();
        assert!(reg.is_empty());
        assert!(matches!(reg.resolve(None), Err(Error::Config(_))));
    }
}
