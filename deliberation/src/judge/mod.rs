//! Proposal judging.
//!
//! Two judges feed the synthesizer with per-proposal quality scores:
//!
//! - [`RuleBasedJudge`]: pure, deterministic checks over a single proposal.
//! - [`PairwiseJudge`]: repeated head-to-head comparisons through a
//!   [`TextGenerator`](crate::generation::TextGenerator), with bias controls.
//!
//! [`JudgeMode::Hybrid`] averages the two.

pub mod pairwise;
pub mod rules;

use serde::{Deserialize, Serialize};

pub use pairwise::{
    rank_by_pairwise, BiasMitigation, ComparisonOutcome, CriterionScores, PairwiseComparison,
    PairwiseJudge, RoundRecord,
};
pub use rules::RuleBasedJudge;

/// How proposals are scored before synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    #[default]
    RuleBased,
    Pairwise,
    Hybrid,
}

impl JudgeMode {
    pub fn uses_rules(&self) -> bool {
        matches!(self, Self::RuleBased | Self::Hybrid)
    }

    pub fn uses_pairwise(&self) -> bool {
        matches!(self, Self::Pairwise | Self::Hybrid)
    }
}

impl std::fmt::Display for JudgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleBased => write!(f, "rule_based"),
            Self::Pairwise => write!(f, "pairwise"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for JudgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "rule_based" | "rules" | "rule" => Ok(Self::RuleBased),
            "pairwise" => Ok(Self::Pairwise),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown judge mode: {other}")),
        }
    }
}

/// Quality scores for one proposal, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub overall: f64,
    pub completeness: f64,
    pub consistency: f64,
    pub evidence_quality: f64,
}

/// A judge's verdict on one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub proposal_id: String,
    pub rater_id: String,
    pub scores: EvaluationScores,
    pub findings: Vec<String>,
    pub mode: JudgeMode,
}

impl Evaluation {
    pub fn overall(&self) -> f64 {
        self.scores.overall
    }

    /// Blend a rule-based evaluation with a pairwise win score.
    ///
    /// Only `overall` is averaged; the component scores stay rule-based.
    pub fn blend_with_pairwise(mut self, pairwise_score: f64) -> Self {
        let pairwise_score = pairwise_score.clamp(0.0, 1.0);
        self.scores.overall = (self.scores.overall + pairwise_score) / 2.0;
        self.findings
            .push(format!("Pairwise win score {pairwise_score:.2}"));
        self.mode = JudgeMode::Hybrid;
        self
    }

    /// Evaluation whose overall score comes only from pairwise results.
    pub fn from_pairwise(proposal_id: &str, rater_id: &str, score: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            proposal_id: proposal_id.to_string(),
            rater_id: rater_id.to_string(),
            scores: EvaluationScores {
                overall: score,
                completeness: score,
                consistency: score,
                evidence_quality: score,
            },
            findings: vec![format!("Pairwise win score {score:.2}")],
            mode: JudgeMode::Pairwise,
        }
    }
}
