//! Generator registry: adapter table keyed by provider name.
//!
//! Raters name a provider key in configuration; the registry resolves it to
//! a shared [`TextGenerator`]. Built explicitly at process start.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{AnthropicMessages, GenerationError, OpenAiCompatible, TextGenerator};

/// Default model used for the OpenAI adapter when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
/// Default model used for the Anthropic adapter when none is configured.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Provider key → adapter table.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    adapters: HashMap<String, Arc<dyn TextGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for `provider`.
    pub fn register(&mut self, provider: impl Into<String>, generator: Arc<dyn TextGenerator>) {
        let provider = provider.into();
        debug!(provider = %provider, "Registering generator adapter");
        self.adapters.insert(provider, generator);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, provider: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        self.register(provider, generator);
        self
    }

    /// Look up the adapter for `provider`.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn TextGenerator>, GenerationError> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| GenerationError::Unavailable(format!("no adapter for '{}'", provider)))
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }

    /// Registered provider keys, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.adapters.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Register reqwest adapters for every provider whose API key is set.
    ///
    /// | Variable | Adapter |
    /// |---|---|
    /// | `OPENAI_API_KEY` (+ `OPENAI_BASE_URL`, `OPENAI_MODEL`) | `openai` |
    /// | `ANTHROPIC_API_KEY` (+ `ANTHROPIC_MODEL`) | `anthropic` |
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let model =
                std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
            let adapter = match std::env::var("OPENAI_BASE_URL") {
                Ok(url) => OpenAiCompatible::with_base_url(key, model, url),
                Err(_) => OpenAiCompatible::new(key, model),
            };
            match adapter {
                Ok(adapter) => registry.register("openai", Arc::new(adapter)),
                Err(e) => warn!("OpenAI adapter unavailable: {}", e),
            }
        }

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            let model = std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_MODEL.to_string());
            match AnthropicMessages::new(key, model) {
                Ok(adapter) => registry.register("anthropic", Arc::new(adapter)),
                Err(e) => warn!("Anthropic adapter unavailable: {}", e),
            }
        }

        registry
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationRequest, GenerationResponse};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        fn provider(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, GenerationError> {
            Ok(GenerationResponse::text(request.user_prompt.clone()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = GeneratorRegistry::new().with("echo", Arc::new(Echo));
        assert!(registry.contains("echo"));
        assert_eq!(registry.get("echo").unwrap().provider(), "echo");
        assert_eq!(registry.providers(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_missing_provider_is_unavailable() {
        let registry = GeneratorRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("openai"),
            Err(GenerationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_registered_adapter_is_callable() {
        let registry = GeneratorRegistry::new().with("echo", Arc::new(Echo));
        let generator = registry.get("echo").unwrap();
        let resp = generator
            .generate(&GenerationRequest::new("sys", "hello"))
            .await
            .unwrap();
        assert_eq!(resp.content, "hello");
    }
}
