//! Narrative writers for consensus results.
//!
//! The narrative is written after every decision field is fixed and is never
//! read back by the synthesizer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::types::ConsensusMethod;
use crate::generation::{generate_with_timeout, GenerationRequest, TextGenerator, TokenUsage};
use crate::prompts::{build_synthesis_prompt, SYNTHESIS_PREAMBLE};

/// Everything a writer may mention.
#[derive(Debug, Clone)]
pub struct ReasoningContext {
    pub winner_choice: String,
    pub confidence: f64,
    pub method: ConsensusMethod,
    pub supporting: usize,
    pub total: usize,
    pub key_points: Vec<String>,
    pub dissent: Vec<String>,
    pub fallback_applied: bool,
}

/// Written narrative plus whatever the writer spent on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Narrative {
    pub text: String,
    pub tokens: TokenUsage,
}

impl Narrative {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: TokenUsage::default(),
        }
    }
}

#[async_trait]
pub trait ReasoningWriter: Send + Sync {
    async fn write(&self, context: &ReasoningContext) -> Narrative;
}

/// Deterministic template.
#[derive(Debug, Clone, Default)]
pub struct TemplateReasoning;

impl TemplateReasoning {
    pub fn render(context: &ReasoningContext) -> String {
        let mut text = format!(
            "{} of {} raters favoured {} under {} voting; calibrated confidence {:.0}%.",
            context.supporting,
            context.total,
            context.winner_choice,
            context.method,
            context.confidence * 100.0
        );
        if context.fallback_applied {
            text.push_str(" The configured method produced no usable signal, so majority voting decided.");
        }
        if !context.key_points.is_empty() {
            text.push_str(" Key points: ");
            text.push_str(&context.key_points.join("; "));
            text.push('.');
        }
        if !context.dissent.is_empty() {
            text.push_str(" Dissent: ");
            text.push_str(&context.dissent.join("; "));
            text.push('.');
        }
        text
    }
}

#[async_trait]
impl ReasoningWriter for TemplateReasoning {
    async fn write(&self, context: &ReasoningContext) -> Narrative {
        Narrative::text(Self::render(context))
    }
}

/// Model-written narrative, falling back to the template on any failure.
pub struct GeneratedReasoning {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl GeneratedReasoning {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }
}

#[async_trait]
impl ReasoningWriter for GeneratedReasoning {
    async fn write(&self, context: &ReasoningContext) -> Narrative {
        let prompt = build_synthesis_prompt(
            &context.winner_choice,
            context.confidence,
            context.method.as_str(),
            &context.key_points,
            &context.dissent,
        );
        let request = GenerationRequest::new(SYNTHESIS_PREAMBLE, prompt)
            .with_temperature(0.2)
            .with_max_tokens(400);
        match generate_with_timeout(self.generator.as_ref(), &request, self.timeout).await {
            Ok(response) if !response.content.trim().is_empty() => Narrative {
                text: response.content.trim().to_string(),
                tokens: response.token_usage,
            },
            Ok(response) => {
                warn!("Generated reasoning was empty, using template");
                Narrative {
                    text: TemplateReasoning::render(context),
                    tokens: response.token_usage,
                }
            }
            Err(e) => {
                warn!(error = %e, "Generated reasoning failed, using template");
                Narrative::text(TemplateReasoning::render(context))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, ScriptedGenerator};

    fn context() -> ReasoningContext {
        ReasoningContext {
            winner_choice: "acme".into(),
            confidence: 0.72,
            method: ConsensusMethod::Majority,
            supporting: 3,
            total: 4,
            key_points: vec!["Invoice paid".into()],
            dissent: vec![],
            fallback_applied: false,
        }
    }

    #[test]
    fn test_template_mentions_outcome() {
        let text = TemplateReasoning::render(&context());
        assert!(text.starts_with("3 of 4 raters favoured acme under majority voting"));
        assert!(text.contains("72%"));
        assert!(text.contains("Invoice paid"));
    }

    #[tokio::test]
    async fn test_generated_falls_back_on_error() {
        let generator = ScriptedGenerator::new("m").then_error(GenerationError::Service("down".into()));
        let writer = GeneratedReasoning::new(Arc::new(generator), Duration::from_secs(1));
        let narrative = writer.write(&context()).await;
        assert_eq!(narrative.text, TemplateReasoning::render(&context()));
        assert_eq!(narrative.tokens.total, 0);
    }

    #[tokio::test]
    async fn test_generated_uses_model_text() {
        let generator = ScriptedGenerator::new("m").then("  The committee sided with Acme.  ");
        let writer = GeneratedReasoning::new(Arc::new(generator), Duration::from_secs(1));
        let narrative = writer.write(&context()).await;
        assert_eq!(narrative.text, "The committee sided with Acme.");
        assert!(narrative.tokens.total > 0);
    }
}
