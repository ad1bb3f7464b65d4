//! Generative-text capability consumed by raters and the pairwise judge.
//!
//! The committee never talks to a model provider directly. Every call goes
//! through [`TextGenerator`], and concrete providers are looked up by key in
//! the [`GeneratorRegistry`] adapter table.
//!
//! ```text
//! ProposerPool ──┐
//!                ├──▶ GeneratorRegistry ──▶ "openai"    → OpenAiCompatible
//! PairwiseJudge ─┘        (lookup)          "anthropic" → AnthropicMessages
//!                                           "<custom>"  → any TextGenerator
//! ```

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::AnthropicMessages;
pub use mock::ScriptedGenerator;
pub use openai::OpenAiCompatible;
pub use registry::GeneratorRegistry;

/// Errors from a single generation call
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Service error: {0}")]
    Service(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// Input contract for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model override; adapters fall back to their configured model.
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.3,
            max_tokens: 1024,
            model: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }

    /// Sum two usages.
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

/// Output contract for one generation call.
///
/// `content` is ideally structured JSON but callers must tolerate free text
/// and truncation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub token_usage: TokenUsage,
    pub raw_response: serde_json::Value,
}

impl GenerationResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            token_usage: TokenUsage::default(),
            raw_response: serde_json::Value::Null,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = usage;
        self
    }
}

/// A provider capable of producing text for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider key this adapter is registered under.
    fn provider(&self) -> &str;

    /// Run one generation.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Run a generation bounded by `timeout`. Elapsed time maps to
/// [`GenerationError::Timeout`].
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<GenerationResponse, GenerationError> {
    match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    }
}
