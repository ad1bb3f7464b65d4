//! Committee decision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{CommitteeError, CommitteeResult};
use crate::consensus::{ConsensusMethod, ConsensusResult, SynthesisError};
use crate::judge::{Evaluation, PairwiseComparison};
use crate::jury::{JuryDeliberation, JuryOutcome};
use crate::proposal::AgentProposal;

/// Pipeline stage for usage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Proposing,
    Judging,
    Synthesizing,
    Jury,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposing => write!(f, "proposing"),
            Self::Judging => write!(f, "judging"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Jury => write!(f, "jury"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUsage {
    pub stage: Stage,
    pub tokens: u64,
    /// Estimated from the configured flat token price.
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl StageUsage {
    pub fn new(stage: Stage, tokens: u64, duration_ms: u64, cost_per_1k_tokens: f64) -> Self {
        Self {
            stage,
            tokens,
            cost_usd: tokens as f64 / 1000.0 * cost_per_1k_tokens,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub stages: Vec<StageUsage>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub wall_clock_ms: u64,
    /// Calibrated confidence of the synthesized consensus.
    pub consensus_level: f64,
    pub proposals_requested: usize,
    pub proposals_received: usize,
    pub escalated: bool,
    pub prompt_version: String,
}

impl DecisionMetrics {
    pub fn record_stage(&mut self, usage: StageUsage) {
        self.total_tokens += usage.tokens;
        self.total_cost_usd += usage.cost_usd;
        self.stages.push(usage);
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageUsage> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Received over requested proposals.
    pub fn yield_rate(&self) -> f64 {
        if self.proposals_requested == 0 {
            return 0.0;
        }
        self.proposals_received as f64 / self.proposals_requested as f64
    }
}

/// Jury record attached to an escalated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliberation: Option<JuryDeliberation>,
    pub outcome: JuryOutcome,
    /// True when the verdict decided the final winner.
    pub verdict_applied: bool,
}

/// Inputs for [`CommitteeDecision::assemble`].
#[derive(Debug, Clone)]
pub struct DecisionDraft {
    pub subject_id: String,
    pub final_winner: String,
    pub proposals: Vec<AgentProposal>,
    pub evaluations: Vec<Evaluation>,
    pub comparisons: Vec<PairwiseComparison>,
    pub consensus: ConsensusResult,
    pub jury: Option<JuryReport>,
    pub metrics: DecisionMetrics,
}

/// Final committee output for one dispute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeDecision {
    pub id: String,
    pub subject_id: String,
    pub final_winner: String,
    /// Confidence behind `final_winner`: the jury's when its verdict applied, else the consensus'.
    pub final_confidence: f64,
    pub proposals: Vec<AgentProposal>,
    pub evaluations: Vec<Evaluation>,
    #[serde(default)]
    pub comparisons: Vec<PairwiseComparison>,
    pub consensus: ConsensusResult,
    pub method: ConsensusMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jury: Option<JuryReport>,
    pub metrics: DecisionMetrics,
    pub decided_at: DateTime<Utc>,
}

impl CommitteeDecision {
    /// Build a decision, rejecting a winner no proposal backs.
    pub fn assemble(draft: DecisionDraft) -> CommitteeResult<Self> {
        if !draft
            .proposals
            .iter()
            .any(|p| p.winner_choice() == draft.final_winner)
        {
            return Err(CommitteeError::Synthesis(SynthesisError::UnbackedWinner(
                draft.final_winner,
            )));
        }

        let final_confidence = match &draft.jury {
            Some(report) if report.verdict_applied => report.outcome.confidence,
            _ => draft.consensus.confidence_level,
        };

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: draft.subject_id,
            final_winner: draft.final_winner,
            final_confidence,
            method: draft.consensus.method,
            proposals: draft.proposals,
            evaluations: draft.evaluations,
            comparisons: draft.comparisons,
            consensus: draft.consensus,
            jury: draft.jury,
            metrics: draft.metrics,
            decided_at: Utc::now(),
        })
    }

    pub fn escalated(&self) -> bool {
        self.jury.is_some()
    }

    pub fn requires_human_review(&self) -> bool {
        self.consensus.quality_flags.requires_human_review
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let jury = match &self.jury {
            Some(r) if r.verdict_applied => " | jury verdict applied",
            Some(_) => " | jury consulted",
            None => "",
        };
        format!(
            "[{}] winner={} confidence={:.2} method={} proposals={}{}",
            self.subject_id,
            self.final_winner,
            self.final_confidence,
            self.method,
            self.proposals.len(),
            jury
        )
    }
}
