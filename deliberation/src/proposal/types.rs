//! Proposal data model: raters, disputes, and the opinions they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::ConsensusMethod;
use crate::generation::TokenUsage;

/// Minimum rater weight accepted by weighted voting.
pub const MIN_RATER_WEIGHT: f64 = 0.1;
/// Maximum rater weight accepted by weighted voting.
pub const MAX_RATER_WEIGHT: f64 = 1.0;

/// Errors building or parsing a proposal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProposalError {
    #[error("Proposal has no winner choice")]
    EmptyWinner,

    #[error("Proposal has no rationale")]
    EmptyRationale,

    #[error("Confidence is not a finite number: {0}")]
    InvalidConfidence(f64),

    #[error("Could not extract an opinion from response: {0}")]
    Unparseable(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

/// One independent source of opinions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaterProfile {
    pub id: String,
    pub name: String,
    /// Adapter key in the generator registry.
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Performance weight used by weighted voting, in [0.1, 1.0].
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Optional persona appended to the proposer system prompt.
    #[serde(default)]
    pub persona: Option<String>,
}

fn default_weight() -> f64 {
    MAX_RATER_WEIGHT
}

impl RaterProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            model: None,
            weight: MAX_RATER_WEIGHT,
            persona: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.set_weight(weight);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Set the weight, clamped to [0.1, 1.0]. Non-finite input leaves it unchanged.
    pub fn set_weight(&mut self, weight: f64) {
        if weight.is_finite() {
            self.weight = weight.clamp(MIN_RATER_WEIGHT, MAX_RATER_WEIGHT);
        }
    }

    /// Nudge the weight by `delta`, staying inside [0.1, 1.0].
    pub fn adjust_weight(&mut self, delta: f64) {
        self.set_weight(self.weight + delta);
    }
}

/// The question put to the committee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeInput {
    pub subject_id: String,
    pub question: String,
    /// Real identifier for the first choice ("partyA" in prompts).
    pub party_a: String,
    /// Real identifier for the second choice ("partyB" in prompts).
    pub party_b: String,
    #[serde(default)]
    pub context: Option<String>,
    /// Overrides the configured consensus method for this run.
    #[serde(default)]
    pub method: Option<ConsensusMethod>,
    /// Always run jury deliberation, regardless of confidence.
    #[serde(default)]
    pub force_jury: bool,
}

impl DisputeInput {
    pub fn new(
        subject_id: impl Into<String>,
        question: impl Into<String>,
        party_a: impl Into<String>,
        party_b: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            question: question.into(),
            party_a: party_a.into(),
            party_b: party_b.into(),
            context: None,
            method: None,
            force_jury: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_method(mut self, method: ConsensusMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_jury(mut self) -> Self {
        self.force_jury = true;
        self
    }

    /// The two choices, in prompt order.
    pub fn parties(&self) -> [&str; 2] {
        [&self.party_a, &self.party_b]
    }
}

/// How a proposal was generated.
///
/// Hand-built proposals count as structured, both from `Default` and when
/// the field is missing on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub temperature: f32,
    pub tokens: TokenUsage,
    pub latency_ms: u64,
    #[serde(default)]
    pub model: Option<String>,
    /// False when the response needed heuristic (non-JSON) parsing.
    #[serde(default = "default_structured")]
    pub structured: bool,
}

fn default_structured() -> bool {
    true
}

impl Default for GenerationMetadata {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            tokens: TokenUsage::default(),
            latency_ms: 0,
            model: None,
            structured: default_structured(),
        }
    }
}

/// A candidate opinion from one rater. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProposal {
    id: String,
    rater_id: String,
    rater_name: String,
    subject_id: String,
    winner_choice: String,
    confidence: f64,
    rationale: String,
    evidence: Vec<String>,
    generation: GenerationMetadata,
    created_at: DateTime<Utc>,
}

impl AgentProposal {
    /// Start building a proposal from `rater` for `subject_id`.
    pub fn builder(rater: &RaterProfile, subject_id: impl Into<String>) -> ProposalBuilder {
        ProposalBuilder {
            rater_id: rater.id.clone(),
            rater_name: rater.name.clone(),
            subject_id: subject_id.into(),
            winner_choice: String::new(),
            confidence: 0.5,
            rationale: String::new(),
            evidence: Vec::new(),
            generation: GenerationMetadata::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rater_id(&self) -> &str {
        &self.rater_id
    }

    pub fn rater_name(&self) -> &str {
        &self.rater_name
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn winner_choice(&self) -> &str {
        &self.winner_choice
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn generation(&self) -> &GenerationMetadata {
        &self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builder enforcing proposal invariants at `build()`.
#[derive(Debug, Clone)]
pub struct ProposalBuilder {
    rater_id: String,
    rater_name: String,
    subject_id: String,
    winner_choice: String,
    confidence: f64,
    rationale: String,
    evidence: Vec<String>,
    generation: GenerationMetadata,
}

impl ProposalBuilder {
    pub fn winner(mut self, choice: impl Into<String>) -> Self {
        self.winner_choice = choice.into();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn evidence<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evidence = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn generation(mut self, generation: GenerationMetadata) -> Self {
        self.generation = generation;
        self
    }

    /// Validate and freeze. Confidence is clamped to [0, 1]; blank evidence
    /// items are dropped.
    pub fn build(self) -> Result<AgentProposal, ProposalError> {
        let winner_choice = self.winner_choice.trim().to_string();
        if winner_choice.is_empty() {
            return Err(ProposalError::EmptyWinner);
        }
        let rationale = self.rationale.trim().to_string();
        if rationale.is_empty() {
            return Err(ProposalError::EmptyRationale);
        }
        if !self.confidence.is_finite() {
            return Err(ProposalError::InvalidConfidence(self.confidence));
        }

        Ok(AgentProposal {
            id: uuid::Uuid::new_v4().to_string(),
            rater_id: self.rater_id,
            rater_name: self.rater_name,
            subject_id: self.subject_id,
            winner_choice,
            confidence: self.confidence.clamp(0.0, 1.0),
            rationale,
            evidence: self
                .evidence
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            generation: self.generation,
            created_at: Utc::now(),
        })
    }
}
