//! Proposer pool: turns raters into proposals.
//!
//! Each attempt is one bounded generation call followed by a parse. Failed
//! attempts are logged and skipped; the batch itself never fails.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::generation::{
    generate_with_timeout, GenerationError, GenerationRequest, GeneratorRegistry,
};
use crate::prompts::{build_proposal_prompt, proposer_system_prompt};

use super::parsing::parse_proposal_response;
use super::types::{AgentProposal, DisputeInput, GenerationMetadata, ProposalError, RaterProfile};

/// Temperature step between successive attempts of one rater.
pub const TEMPERATURE_STEP: f32 = 0.1;
/// Upper bound for attempt temperature.
pub const MAX_ATTEMPT_TEMPERATURE: f32 = 1.0;

/// Temperature for attempt `index` (0-based).
pub fn attempt_temperature(base: f32, index: usize) -> f32 {
    (base + TEMPERATURE_STEP * index as f32).min(MAX_ATTEMPT_TEMPERATURE)
}

/// Generates proposals from a fixed set of raters.
#[derive(Debug, Clone)]
pub struct ProposerPool {
    registry: GeneratorRegistry,
    raters: Vec<RaterProfile>,
    base_temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
}

impl ProposerPool {
    pub fn new(registry: GeneratorRegistry, raters: Vec<RaterProfile>) -> Self {
        Self {
            registry,
            raters,
            base_temperature: 0.3,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_temperature(mut self, temperature: f32) -> Self {
        self.base_temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn raters(&self) -> &[RaterProfile] {
        &self.raters
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Current weight of a rater, if known.
    pub fn weight_of(&self, rater_id: &str) -> Option<f64> {
        self.raters.iter().find(|r| r.id == rater_id).map(|r| r.weight)
    }

    /// Set a rater's weight (clamped to [0.1, 1.0]). Returns false for unknown raters.
    pub fn update_weight(&mut self, rater_id: &str, weight: f64) -> bool {
        match self.raters.iter_mut().find(|r| r.id == rater_id) {
            Some(rater) => {
                rater.set_weight(weight);
                true
            }
            None => false,
        }
    }

    /// Generate up to `count` proposals from `rater`. Never fails; the result
    /// may be shorter than `count` or empty.
    pub async fn generate_proposals(
        &self,
        rater: &RaterProfile,
        input: &DisputeInput,
        count: usize,
    ) -> Vec<AgentProposal> {
        let mut proposals = Vec::with_capacity(count);
        for index in 0..count {
            let temperature = attempt_temperature(self.base_temperature, index);
            match self.attempt(rater, input, temperature).await {
                Ok(proposal) => {
                    debug!(
                        rater_id = %rater.id,
                        attempt = index,
                        winner = %proposal.winner_choice(),
                        confidence = proposal.confidence(),
                        "Proposal generated"
                    );
                    proposals.push(proposal);
                }
                Err(e) => {
                    warn!(
                        rater_id = %rater.id,
                        provider = %rater.provider,
                        attempt = index,
                        error = %e,
                        "Proposal attempt failed, skipping"
                    );
                }
            }
        }
        proposals
    }

    async fn attempt(
        &self,
        rater: &RaterProfile,
        input: &DisputeInput,
        temperature: f32,
    ) -> Result<AgentProposal, ProposalError> {
        let generator = self
            .registry
            .get(&rater.provider)
            .map_err(|e| ProposalError::Generation(e.to_string()))?;

        let mut request = GenerationRequest::new(
            proposer_system_prompt(rater.persona.as_deref()),
            build_proposal_prompt(input),
        )
        .with_temperature(temperature)
        .with_max_tokens(self.max_tokens);
        if let Some(ref model) = rater.model {
            request = request.with_model(model.clone());
        }

        let start = Instant::now();
        let response = generate_with_timeout(generator.as_ref(), &request, self.request_timeout)
            .await
            .map_err(|e: GenerationError| ProposalError::Generation(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let opinion = parse_proposal_response(&response.content, &input.party_a, &input.party_b)?;

        AgentProposal::builder(rater, input.subject_id.clone())
            .winner(opinion.winner_choice)
            .confidence(opinion.confidence)
            .rationale(opinion.rationale)
            .evidence(opinion.evidence)
            .generation(GenerationMetadata {
                temperature: request.temperature,
                tokens: response.token_usage,
                latency_ms,
                model: request.model.clone(),
                structured: opinion.structured,
            })
            .build()
    }
}
