//! Consensus synthesizer.
//!
//! ```text
//! proposals + evaluations
//!        │
//!        ▼
//!  1. tally (method)     → winner, base confidence
//!  2. merge evidence     → top 10 from winner-agreeing proposals
//!  3. metrics            → unanimity, variance, overlap, fragments
//!  4. calibrate          → confidence + residual uncertainty
//!  5. flags/alternatives
//!  6. narrative          → ReasoningWriter (text only)
//! ```
//!
//! Steps 1–5 are pure; [`ConsensusSynthesizer::decide`] runs them without any
//! I/O, so the same inputs always give the same decision fields.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::evidence::merge_evidence;
use super::metrics::{alternative_choices, calibrate, compute_metrics};
use super::reasoning::{ReasoningContext, ReasoningWriter, TemplateReasoning};
use super::types::{
    ConsensusMethod, ConsensusResult, QualityFlags, SynthesisError, SynthesisResult,
};
use super::voting::{tally, Ballot};
use crate::generation::TokenUsage;
use crate::judge::Evaluation;
use crate::proposal::AgentProposal;

/// Default residual uncertainty above which a human should review.
pub const DEFAULT_HUMAN_REVIEW_THRESHOLD: f64 = 0.4;

const MINORITY_DISSENT_BELOW: f64 = 0.8;
const HUMAN_REVIEW_UNANIMITY_BELOW: f64 = 0.6;
const MIN_EVIDENCE_PER_PROPOSAL: usize = 2;
const CONFLICTING_EVIDENCE_ABOVE: usize = 2;

pub struct ConsensusSynthesizer {
    human_review_threshold: f64,
    writer: Arc<dyn ReasoningWriter>,
}

impl ConsensusSynthesizer {
    pub fn new() -> Self {
        Self {
            human_review_threshold: DEFAULT_HUMAN_REVIEW_THRESHOLD,
            writer: Arc::new(TemplateReasoning),
        }
    }

    pub fn with_human_review_threshold(mut self, threshold: f64) -> Self {
        self.human_review_threshold = threshold;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn ReasoningWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Compute every decision field. `synthesized_reasoning` is left empty.
    pub fn decide(
        &self,
        proposals: &[AgentProposal],
        evaluations: &[Evaluation],
        method: ConsensusMethod,
        weights: &HashMap<String, f64>,
    ) -> SynthesisResult<ConsensusResult> {
        if proposals.is_empty() {
            return Err(SynthesisError::NoProposals);
        }

        let scores: HashMap<String, f64> = evaluations
            .iter()
            .map(|e| (e.proposal_id.clone(), e.scores.overall))
            .collect();
        let evidence_quality: HashMap<String, f64> = evaluations
            .iter()
            .map(|e| (e.proposal_id.clone(), e.scores.evidence_quality))
            .collect();

        let vote = tally(
            method,
            &Ballot {
                proposals,
                scores: &scores,
                weights,
            },
        )?;
        if !proposals.iter().any(|p| p.winner_choice() == vote.winner) {
            return Err(SynthesisError::UnbackedWinner(vote.winner));
        }

        let merged_evidence = merge_evidence(proposals, &evidence_quality, &vote.winner);
        let metrics = compute_metrics(proposals, &vote.winner);
        let (confidence_level, residual_uncertainty) = calibrate(vote.base_confidence, &metrics);

        let quality_flags = QualityFlags {
            minority_dissent: metrics.unanimity_level < MINORITY_DISSENT_BELOW,
            insufficient_evidence: proposals
                .iter()
                .any(|p| p.evidence().len() < MIN_EVIDENCE_PER_PROPOSAL),
            conflicting_evidence: metrics.conflicting_points.len() > CONFLICTING_EVIDENCE_ABOVE,
            requires_human_review: residual_uncertainty > self.human_review_threshold
                || metrics.unanimity_level < HUMAN_REVIEW_UNANIMITY_BELOW,
        };

        info!(
            method = %method,
            winner = %vote.winner,
            raw_confidence = vote.base_confidence,
            confidence = confidence_level,
            residual = residual_uncertainty,
            unanimity = metrics.unanimity_level,
            fallback = vote.fallback_applied,
            "Consensus synthesized"
        );

        Ok(ConsensusResult {
            alternative_choices: alternative_choices(proposals, &vote.winner),
            winner_choice: vote.winner,
            confidence_level,
            residual_uncertainty,
            merged_evidence,
            synthesized_reasoning: String::new(),
            reasoning_tokens: TokenUsage::default(),
            method,
            raw_confidence: vote.base_confidence,
            fallback_applied: vote.fallback_applied,
            metrics,
            quality_flags,
        })
    }

    /// [`decide`](Self::decide), then write the narrative.
    pub async fn synthesize(
        &self,
        proposals: &[AgentProposal],
        evaluations: &[Evaluation],
        method: ConsensusMethod,
        weights: &HashMap<String, f64>,
    ) -> SynthesisResult<ConsensusResult> {
        let mut result = self.decide(proposals, evaluations, method, weights)?;
        let context = reasoning_context(&result, proposals);
        let narrative = self.writer.write(&context).await;
        result.synthesized_reasoning = narrative.text;
        result.reasoning_tokens = narrative.tokens;
        Ok(result)
    }
}

impl Default for ConsensusSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer input derived from a finished result.
pub fn reasoning_context(result: &ConsensusResult, proposals: &[AgentProposal]) -> ReasoningContext {
    let supporting = proposals
        .iter()
        .filter(|p| p.winner_choice() == result.winner_choice)
        .count();
    let mut key_points = result.metrics.shared_points.clone();
    if key_points.is_empty() {
        key_points = result.metrics.unique_insights.iter().take(3).cloned().collect();
    }
    let dissent = result
        .alternative_choices
        .iter()
        .map(|a| format!("{} ({:.0}% support)", a.choice, a.support * 100.0))
        .collect();
    ReasoningContext {
        winner_choice: result.winner_choice.clone(),
        confidence: result.confidence_level,
        method: result.method,
        supporting,
        total: proposals.len(),
        key_points,
        dissent,
        fallback_applied: result.fallback_applied,
    }
}
