//! Consensus result types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::TokenUsage;

/// Errors from consensus synthesis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("No proposals to synthesize")]
    NoProposals,

    #[error("Winner {0} is not backed by any proposal")]
    UnbackedWinner(String),
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Vote aggregation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Plurality of winner choices.
    #[default]
    Majority,
    /// Rank by evaluation score, award n−1−rank points.
    Borda,
    /// rater weight × evaluation score × confidence.
    WeightedVoting,
    /// Count proposals that clear the approval bar.
    Approval,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Majority => "majority",
            Self::Borda => "borda",
            Self::WeightedVoting => "weighted_voting",
            Self::Approval => "approval",
        }
    }
}

impl std::fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConsensusMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "majority" | "plurality" => Ok(Self::Majority),
            "borda" | "borda_count" => Ok(Self::Borda),
            "weighted" | "weighted_voting" => Ok(Self::WeightedVoting),
            "approval" => Ok(Self::Approval),
            other => Err(format!("unknown consensus method: {other}")),
        }
    }
}

/// Agreement metrics over the proposal set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    /// Fraction of proposals backing the winner.
    pub unanimity_level: f64,
    /// Population variance of all proposal confidences.
    pub confidence_variance: f64,
    /// Evidence cited by ≥2 proposals over all distinct evidence.
    pub evidence_overlap: f64,
    pub shared_points: Vec<String>,
    pub conflicting_points: Vec<String>,
    pub unique_insights: Vec<String>,
}

/// A losing choice and its support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeChoice {
    pub choice: String,
    /// Fraction of proposals backing this choice.
    pub support: f64,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub minority_dissent: bool,
    pub insufficient_evidence: bool,
    pub conflicting_evidence: bool,
    pub requires_human_review: bool,
}

impl QualityFlags {
    pub fn any(&self) -> bool {
        self.minority_dissent
            || self.insufficient_evidence
            || self.conflicting_evidence
            || self.requires_human_review
    }
}

/// Synthesized committee answer.
///
/// `confidence_level + residual_uncertainty == 1` to four decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub winner_choice: String,
    pub confidence_level: f64,
    pub residual_uncertainty: f64,
    /// Ranked, deduplicated, at most 10 items.
    pub merged_evidence: Vec<String>,
    /// Narrative only. Never feeds back into any decision field.
    pub synthesized_reasoning: String,
    /// Usage spent writing the narrative.
    #[serde(default)]
    pub reasoning_tokens: TokenUsage,
    pub method: ConsensusMethod,
    /// Base confidence before calibration.
    pub raw_confidence: f64,
    /// Approval found no approvals (or weights summed to zero) and majority was used.
    #[serde(default)]
    pub fallback_applied: bool,
    pub metrics: ConsensusMetrics,
    pub alternative_choices: Vec<AlternativeChoice>,
    pub quality_flags: QualityFlags,
}

impl ConsensusResult {
    /// Equality over decision fields, ignoring the narrative and its usage.
    pub fn decision_eq(&self, other: &Self) -> bool {
        self.winner_choice == other.winner_choice
            && self.confidence_level == other.confidence_level
            && self.residual_uncertainty == other.residual_uncertainty
            && self.merged_evidence == other.merged_evidence
            && self.method == other.method
            && self.raw_confidence == other.raw_confidence
            && self.fallback_applied == other.fallback_applied
            && self.metrics == other.metrics
            && self.alternative_choices == other.alternative_choices
            && self.quality_flags == other.quality_flags
    }

    /// Complement invariant, checked to four decimals.
    pub fn is_calibrated(&self) -> bool {
        ((self.confidence_level + self.residual_uncertainty) - 1.0).abs() < 1e-4
    }
}
