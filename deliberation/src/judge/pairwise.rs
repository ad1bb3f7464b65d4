//! Pairwise judge.
//!
//! Compares two proposals head-to-head over several rounds through a
//! [`TextGenerator`]. Each round may present the pair in swapped order, with
//! long text truncated and rater names masked. Swapped rounds are mapped back
//! before aggregation so the record is always in A/B terms.
//!
//! Aggregation:
//! - winner = plurality across rounds (a count tie yields `Tie`)
//! - consensus_strength = winning rounds / total rounds
//! - confidence = mean round confidence × consensus_strength
//!
//! A round that fails (call error, timeout, unparseable reply) counts as a
//! neutral tie at 0.5 confidence. Comparisons never fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generation::{generate_with_timeout, GenerationRequest, TextGenerator, TokenUsage};
use crate::prompts::{build_comparison_prompt, ComparisonSide, PAIRWISE_JUDGE_PREAMBLE};
use crate::proposal::parsing::{extract_json_object, truncate_chars};
use crate::proposal::AgentProposal;

/// Rationale cap when length normalization is on.
pub const MAX_COMPARED_RATIONALE_CHARS: usize = 500;
/// Per-item evidence cap when length normalization is on.
pub const MAX_COMPARED_EVIDENCE_CHARS: usize = 200;
/// Confidence and criterion score assigned to a failed round.
pub const NEUTRAL_SCORE: f64 = 0.5;

const FIRST_LABEL: &str = "Proposal 1";
const SECOND_LABEL: &str = "Proposal 2";

/// Bias-mitigation toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasMitigation {
    pub randomize_order: bool,
    pub mask_agent_names: bool,
    pub normalize_length: bool,
    /// When false, every comparison runs a single round.
    pub multiple_rounds: bool,
}

impl Default for BiasMitigation {
    fn default() -> Self {
        Self {
            randomize_order: true,
            mask_agent_names: true,
            normalize_length: true,
            multiple_rounds: true,
        }
    }
}

/// Outcome of a round or a whole comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    A,
    B,
    Tie,
}

impl std::fmt::Display for ComparisonOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Tie => write!(f, "tie"),
        }
    }
}

/// Per-criterion scores for one side, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    #[serde(default = "neutral_score")]
    pub accuracy: f64,
    #[serde(default = "neutral_score")]
    pub reasoning: f64,
    #[serde(default = "neutral_score")]
    pub evidence_quality: f64,
    #[serde(default = "neutral_score")]
    pub clarity: f64,
}

fn neutral_score() -> f64 {
    NEUTRAL_SCORE
}

impl CriterionScores {
    pub fn neutral() -> Self {
        Self {
            accuracy: NEUTRAL_SCORE,
            reasoning: NEUTRAL_SCORE,
            evidence_quality: NEUTRAL_SCORE,
            clarity: NEUTRAL_SCORE,
        }
    }

    pub fn mean(&self) -> f64 {
        (self.accuracy + self.reasoning + self.evidence_quality + self.clarity) / 4.0
    }

    fn clamped(self) -> Self {
        let c = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { NEUTRAL_SCORE };
        Self {
            accuracy: c(self.accuracy),
            reasoning: c(self.reasoning),
            evidence_quality: c(self.evidence_quality),
            clarity: c(self.clarity),
        }
    }

    fn average(scores: &[CriterionScores]) -> Self {
        if scores.is_empty() {
            return Self::neutral();
        }
        let n = scores.len() as f64;
        Self {
            accuracy: scores.iter().map(|s| s.accuracy).sum::<f64>() / n,
            reasoning: scores.iter().map(|s| s.reasoning).sum::<f64>() / n,
            evidence_quality: scores.iter().map(|s| s.evidence_quality).sum::<f64>() / n,
            clarity: scores.iter().map(|s| s.clarity).sum::<f64>() / n,
        }
    }
}

/// One judged round, already mapped back to A/B order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub outcome: ComparisonOutcome,
    pub confidence: f64,
    pub scores_a: CriterionScores,
    pub scores_b: CriterionScores,
    pub reasoning: Vec<String>,
    /// B was shown first.
    pub swapped: bool,
    /// Round fell back to a neutral tie.
    pub failed: bool,
    #[serde(default)]
    pub tokens: TokenUsage,
}

impl RoundRecord {
    /// Neutral tie used when a round cannot be judged.
    pub fn neutral(round: u32, swapped: bool, reason: impl Into<String>) -> Self {
        Self {
            round,
            outcome: ComparisonOutcome::Tie,
            confidence: NEUTRAL_SCORE,
            scores_a: CriterionScores::neutral(),
            scores_b: CriterionScores::neutral(),
            reasoning: vec![reason.into()],
            swapped,
            failed: true,
            tokens: TokenUsage::default(),
        }
    }

    fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = tokens;
        self
    }
}

/// Aggregated result of comparing two proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseComparison {
    pub proposal_a_id: String,
    pub proposal_b_id: String,
    pub winner: ComparisonOutcome,
    pub score_a: f64,
    pub score_b: f64,
    pub criteria_a: CriterionScores,
    pub criteria_b: CriterionScores,
    pub reasoning: Vec<String>,
    pub confidence: f64,
    pub consensus_strength: f64,
    pub rounds: Vec<RoundRecord>,
    /// Judge usage summed over all rounds.
    #[serde(default)]
    pub tokens: TokenUsage,
}

impl PairwiseComparison {
    /// Aggregate round records into a comparison.
    pub fn aggregate(proposal_a_id: &str, proposal_b_id: &str, rounds: Vec<RoundRecord>) -> Self {
        let total = rounds.len();
        let count = |o: ComparisonOutcome| rounds.iter().filter(|r| r.outcome == o).count();
        let (a, b, tie) = (
            count(ComparisonOutcome::A),
            count(ComparisonOutcome::B),
            count(ComparisonOutcome::Tie),
        );

        let top = a.max(b).max(tie);
        let leaders = [a, b, tie].iter().filter(|&&c| c == top).count();
        let winner = if total == 0 || leaders > 1 {
            ComparisonOutcome::Tie
        } else if a == top {
            ComparisonOutcome::A
        } else if b == top {
            ComparisonOutcome::B
        } else {
            ComparisonOutcome::Tie
        };

        let consensus_strength = if total == 0 {
            0.0
        } else {
            top as f64 / total as f64
        };
        let mean_confidence = if total == 0 {
            0.0
        } else {
            rounds.iter().map(|r| r.confidence).sum::<f64>() / total as f64
        };

        let criteria_a =
            CriterionScores::average(&rounds.iter().map(|r| r.scores_a).collect::<Vec<_>>());
        let criteria_b =
            CriterionScores::average(&rounds.iter().map(|r| r.scores_b).collect::<Vec<_>>());

        let mut tokens = TokenUsage::default();
        for round in &rounds {
            tokens.add(round.tokens);
        }

        let mut reasoning = Vec::new();
        for round in &rounds {
            for point in &round.reasoning {
                if !reasoning.contains(point) {
                    reasoning.push(point.clone());
                }
            }
        }

        Self {
            proposal_a_id: proposal_a_id.to_string(),
            proposal_b_id: proposal_b_id.to_string(),
            winner,
            score_a: criteria_a.mean(),
            score_b: criteria_b.mean(),
            criteria_a,
            criteria_b,
            reasoning,
            confidence: mean_confidence * consensus_strength,
            consensus_strength,
            rounds,
            tokens,
        }
    }

    pub fn involves(&self, proposal_id: &str) -> bool {
        self.proposal_a_id == proposal_id || self.proposal_b_id == proposal_id
    }
}

#[derive(Debug, Deserialize)]
struct RawSides {
    #[serde(alias = "proposal1", alias = "1", alias = "first")]
    proposal_1: Option<CriterionScores>,
    #[serde(alias = "proposal2", alias = "2", alias = "second")]
    proposal_2: Option<CriterionScores>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "verdict", alias = "better")]
    winner: serde_json::Value,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    scores: Option<RawSides>,
    #[serde(default)]
    reasoning: Option<serde_json::Value>,
}

/// Which displayed position the judge picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shown {
    First,
    Second,
    Tie,
}

fn shown_from_token(value: &serde_json::Value) -> Option<Shown> {
    let token = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => return Some(Shown::Tie),
        _ => return None,
    };
    let normalized: String = token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    match normalized.as_str() {
        "1" | "proposal1" | "first" | "a" => Some(Shown::First),
        "2" | "proposal2" | "second" | "b" => Some(Shown::Second),
        "tie" | "draw" | "equal" | "none" | "neither" => Some(Shown::Tie),
        _ => None,
    }
}

/// Parsed round in displayed order.
struct ShownVerdict {
    pick: Shown,
    confidence: f64,
    first: CriterionScores,
    second: CriterionScores,
    reasoning: Vec<String>,
}

fn parse_verdict(content: &str) -> Option<ShownVerdict> {
    let value = extract_json_object(content)?;
    let raw: RawVerdict = serde_json::from_value(value).ok()?;
    let pick = shown_from_token(&raw.winner)?;
    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| if c > 1.0 && c <= 100.0 { c / 100.0 } else { c })
        .unwrap_or(NEUTRAL_SCORE)
        .clamp(0.0, 1.0);
    let (first, second) = match raw.scores {
        Some(sides) => (
            sides.proposal_1.unwrap_or_else(CriterionScores::neutral).clamped(),
            sides.proposal_2.unwrap_or_else(CriterionScores::neutral).clamped(),
        ),
        None => (CriterionScores::neutral(), CriterionScores::neutral()),
    };
    let reasoning = match raw.reasoning {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s],
        _ => Vec::new(),
    };
    Some(ShownVerdict {
        pick,
        confidence,
        first,
        second,
        reasoning,
    })
}

/// Head-to-head judge backed by a text generator.
pub struct PairwiseJudge {
    generator: Arc<dyn TextGenerator>,
    bias: BiasMitigation,
    rng: Mutex<StdRng>,
    request_timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl PairwiseJudge {
    pub fn new(generator: Arc<dyn TextGenerator>, bias: BiasMitigation) -> Self {
        Self {
            generator,
            bias,
            rng: Mutex::new(StdRng::from_entropy()),
            request_timeout: Duration::from_secs(60),
            temperature: 0.2,
            max_tokens: 768,
        }
    }

    /// Fix the order-randomization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn bias(&self) -> BiasMitigation {
        self.bias
    }

    /// Rounds actually run for a requested count.
    pub fn effective_rounds(&self, requested: u32) -> u32 {
        if self.bias.multiple_rounds {
            requested.max(1)
        } else {
            1
        }
    }

    fn should_swap(&self) -> bool {
        if !self.bias.randomize_order {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(0.5),
            Err(poisoned) => poisoned.into_inner().gen_bool(0.5),
        }
    }

    /// Compare `a` against `b` over `rounds` sequential rounds.
    pub async fn perform_pairwise_comparison(
        &self,
        question: &str,
        a: &AgentProposal,
        b: &AgentProposal,
        rounds: u32,
    ) -> PairwiseComparison {
        let rounds = self.effective_rounds(rounds);
        let mut records = Vec::with_capacity(rounds as usize);
        for round in 1..=rounds {
            let swapped = self.should_swap();
            records.push(self.judge_round(question, a, b, round, swapped).await);
        }
        let comparison = PairwiseComparison::aggregate(a.id(), b.id(), records);
        debug!(
            proposal_a = %comparison.proposal_a_id,
            proposal_b = %comparison.proposal_b_id,
            winner = %comparison.winner,
            confidence = comparison.confidence,
            consensus_strength = comparison.consensus_strength,
            "Pairwise comparison complete"
        );
        comparison
    }

    /// Compare every unordered pair. Pairs run concurrently.
    pub async fn compare_all(
        &self,
        question: &str,
        proposals: &[AgentProposal],
        rounds: u32,
    ) -> Vec<PairwiseComparison> {
        let mut pending = Vec::new();
        for i in 0..proposals.len() {
            for j in (i + 1)..proposals.len() {
                pending.push(self.perform_pairwise_comparison(
                    question,
                    &proposals[i],
                    &proposals[j],
                    rounds,
                ));
            }
        }
        join_all(pending).await
    }

    async fn judge_round(
        &self,
        question: &str,
        a: &AgentProposal,
        b: &AgentProposal,
        round: u32,
        swapped: bool,
    ) -> RoundRecord {
        let (first, second) = if swapped { (b, a) } else { (a, b) };
        let first_view = self.view(first);
        let second_view = self.view(second);
        let prompt = build_comparison_prompt(
            question,
            &first_view.side(FIRST_LABEL),
            &second_view.side(SECOND_LABEL),
        );
        let request = GenerationRequest::new(PAIRWISE_JUDGE_PREAMBLE, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response =
            match generate_with_timeout(self.generator.as_ref(), &request, self.request_timeout)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(round, error = %e, "Pairwise round failed, counting as tie");
                    return RoundRecord::neutral(round, swapped, format!("Round failed: {e}"));
                }
            };

        let Some(verdict) = parse_verdict(&response.content) else {
            warn!(round, "Pairwise verdict unparseable, counting as tie");
            return RoundRecord::neutral(round, swapped, "Verdict could not be parsed")
                .with_tokens(response.token_usage);
        };

        // Map displayed positions back to A/B.
        let (outcome, scores_a, scores_b) = match (verdict.pick, swapped) {
            (Shown::Tie, false) => (ComparisonOutcome::Tie, verdict.first, verdict.second),
            (Shown::Tie, true) => (ComparisonOutcome::Tie, verdict.second, verdict.first),
            (Shown::First, false) => (ComparisonOutcome::A, verdict.first, verdict.second),
            (Shown::Second, false) => (ComparisonOutcome::B, verdict.first, verdict.second),
            (Shown::First, true) => (ComparisonOutcome::B, verdict.second, verdict.first),
            (Shown::Second, true) => (ComparisonOutcome::A, verdict.second, verdict.first),
        };

        RoundRecord {
            round,
            outcome,
            confidence: verdict.confidence,
            scores_a,
            scores_b,
            reasoning: verdict.reasoning,
            swapped,
            failed: false,
            tokens: response.token_usage,
        }
    }

    fn view(&self, proposal: &AgentProposal) -> ProposalView {
        let (rationale, evidence) = if self.bias.normalize_length {
            (
                truncate_chars(proposal.rationale(), MAX_COMPARED_RATIONALE_CHARS),
                proposal
                    .evidence()
                    .iter()
                    .map(|e| truncate_chars(e, MAX_COMPARED_EVIDENCE_CHARS))
                    .collect(),
            )
        } else {
            (proposal.rationale().to_string(), proposal.evidence().to_vec())
        };
        ProposalView {
            rater: (!self.bias.mask_agent_names).then(|| proposal.rater_name().to_string()),
            winner_choice: proposal.winner_choice().to_string(),
            confidence: proposal.confidence(),
            rationale,
            evidence,
        }
    }
}

struct ProposalView {
    rater: Option<String>,
    winner_choice: String,
    confidence: f64,
    rationale: String,
    evidence: Vec<String>,
}

impl ProposalView {
    fn side<'a>(&'a self, label: &'a str) -> ComparisonSide<'a> {
        ComparisonSide {
            label,
            rater: self.rater.as_deref(),
            winner_choice: &self.winner_choice,
            confidence: self.confidence,
            rationale: &self.rationale,
            evidence: &self.evidence,
        }
    }
}

/// Win score per proposal id: (wins + ½ ties) / comparisons involved.
///
/// Proposals that appear in no comparison score 0.5.
pub fn rank_by_pairwise(
    proposals: &[AgentProposal],
    comparisons: &[PairwiseComparison],
) -> HashMap<String, f64> {
    proposals
        .iter()
        .map(|p| {
            let mut played = 0usize;
            let mut points = 0.0;
            for c in comparisons.iter().filter(|c| c.involves(p.id())) {
                played += 1;
                let is_a = c.proposal_a_id == p.id();
                points += match (c.winner, is_a) {
                    (ComparisonOutcome::Tie, _) => 0.5,
                    (ComparisonOutcome::A, true) | (ComparisonOutcome::B, false) => 1.0,
                    _ => 0.0,
                };
            }
            let score = if played == 0 {
                NEUTRAL_SCORE
            } else {
                points / played as f64
            };
            (p.id().to_string(), score)
        })
        .collect()
}
