//! Winner selection for each consensus method.
//!
//! Every method returns a [`VoteTally`]: the winning choice and a base
//! confidence in [0, 1] before calibration. Ties are broken by the highest
//! summed proposal confidence, then by lexicographic choice, so the same
//! input always yields the same winner.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::types::{ConsensusMethod, SynthesisError, SynthesisResult};
use crate::proposal::AgentProposal;

/// Evaluation score assumed for a proposal that was never judged.
pub const DEFAULT_EVALUATION_SCORE: f64 = 0.5;
/// Rater weight assumed when none is configured.
pub const DEFAULT_RATER_WEIGHT: f64 = 1.0;
/// Score or confidence needed for approval.
pub const APPROVAL_THRESHOLD: f64 = 0.7;
/// Bonus added when the winner holds at least two approvals.
pub const APPROVAL_BONUS: f64 = 0.2;

/// Outcome of one vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteTally {
    pub winner: String,
    pub base_confidence: f64,
    pub method: ConsensusMethod,
    pub fallback_applied: bool,
}

/// Inputs shared by every method.
#[derive(Debug, Clone, Copy)]
pub struct Ballot<'a> {
    pub proposals: &'a [AgentProposal],
    /// Evaluation score per proposal id.
    pub scores: &'a HashMap<String, f64>,
    /// Weight per rater id.
    pub weights: &'a HashMap<String, f64>,
}

impl<'a> Ballot<'a> {
    fn score(&self, proposal: &AgentProposal) -> f64 {
        self.scores
            .get(proposal.id())
            .copied()
            .unwrap_or(DEFAULT_EVALUATION_SCORE)
    }

    fn weight(&self, proposal: &AgentProposal) -> f64 {
        self.weights
            .get(proposal.rater_id())
            .copied()
            .unwrap_or(DEFAULT_RATER_WEIGHT)
    }
}

/// Run `method` over the ballot.
pub fn tally(method: ConsensusMethod, ballot: &Ballot<'_>) -> SynthesisResult<VoteTally> {
    if ballot.proposals.is_empty() {
        return Err(SynthesisError::NoProposals);
    }
    let tally = match method {
        ConsensusMethod::Majority => majority_vote(ballot.proposals),
        ConsensusMethod::Borda => borda_count(ballot),
        ConsensusMethod::WeightedVoting => weighted_vote(ballot),
        ConsensusMethod::Approval => approval_vote(ballot),
    };
    debug!(
        method = %tally.method,
        winner = %tally.winner,
        base_confidence = tally.base_confidence,
        fallback = tally.fallback_applied,
        "Vote tallied"
    );
    Ok(tally)
}

/// Summed proposal confidence per choice.
fn confidence_sums(proposals: &[AgentProposal]) -> HashMap<&str, f64> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for p in proposals {
        *sums.entry(p.winner_choice()).or_insert(0.0) += p.confidence();
    }
    sums
}

/// Pick the highest-scoring choice with deterministic tie-breaking.
///
/// `totals` is a BTreeMap so iteration order is lexicographic.
fn pick_winner(totals: &BTreeMap<&str, f64>, proposals: &[AgentProposal]) -> (String, f64) {
    let sums = confidence_sums(proposals);
    let mut best: Option<(&str, f64, f64)> = None;
    for (&choice, &score) in totals {
        let conf = sums.get(choice).copied().unwrap_or(0.0);
        let better = match best {
            None => true,
            Some((_, best_score, best_conf)) => {
                score > best_score + f64::EPSILON
                    || ((score - best_score).abs() <= f64::EPSILON && conf > best_conf + f64::EPSILON)
            }
        };
        // Equal score and confidence keeps the lexicographically smaller choice.
        if better {
            best = Some((choice, score, conf));
        }
    }
    best.map(|(c, s, _)| (c.to_string(), s))
        .unwrap_or_default()
}

/// Plurality of winner choices. Confidence = winner votes / total.
pub fn majority_vote(proposals: &[AgentProposal]) -> VoteTally {
    let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
    for p in proposals {
        *counts.entry(p.winner_choice()).or_insert(0.0) += 1.0;
    }
    let (winner, votes) = pick_winner(&counts, proposals);
    let total = proposals.len().max(1) as f64;
    VoteTally {
        winner,
        base_confidence: votes / total,
        method: ConsensusMethod::Majority,
        fallback_applied: false,
    }
}

/// Borda count over evaluation ranks.
///
/// Proposals are ranked by evaluation score (stable on input order); rank r of
/// n earns n−1−r points for its choice. Confidence = winner points /
/// (n(n−1)/2), or 1 when n = 1.
pub fn borda_count(ballot: &Ballot<'_>) -> VoteTally {
    let proposals = ballot.proposals;
    let n = proposals.len();
    let mut ranked: Vec<&AgentProposal> = proposals.iter().collect();
    ranked.sort_by(|a, b| ballot.score(b).total_cmp(&ballot.score(a)));

    let mut points: BTreeMap<&str, f64> = BTreeMap::new();
    for (rank, p) in ranked.iter().enumerate() {
        *points.entry(p.winner_choice()).or_insert(0.0) += (n - 1 - rank) as f64;
    }
    let (winner, winner_points) = pick_winner(&points, proposals);
    let base_confidence = if n <= 1 {
        1.0
    } else {
        winner_points / ((n * (n - 1)) as f64 / 2.0)
    };
    VoteTally {
        winner,
        base_confidence,
        method: ConsensusMethod::Borda,
        fallback_applied: false,
    }
}

/// Weight = rater weight × evaluation score × confidence.
///
/// Confidence = winner weight / total weight. A zero total falls back to
/// majority.
pub fn weighted_vote(ballot: &Ballot<'_>) -> VoteTally {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for p in ballot.proposals {
        let w = ballot.weight(p) * ballot.score(p) * p.confidence();
        *totals.entry(p.winner_choice()).or_insert(0.0) += w.max(0.0);
    }
    let total: f64 = totals.values().sum();
    if total <= f64::EPSILON {
        warn!("Weighted vote has zero total weight, using majority");
        return VoteTally {
            method: ConsensusMethod::WeightedVoting,
            fallback_applied: true,
            ..majority_vote(ballot.proposals)
        };
    }
    let (winner, winner_weight) = pick_winner(&totals, ballot.proposals);
    VoteTally {
        winner,
        base_confidence: (winner_weight / total).clamp(0.0, 1.0),
        method: ConsensusMethod::WeightedVoting,
        fallback_applied: false,
    }
}

/// Whether a proposal clears the approval bar.
pub fn is_approved(score: f64, confidence: f64) -> bool {
    score >= APPROVAL_THRESHOLD || confidence >= APPROVAL_THRESHOLD
}

/// Approval voting.
///
/// Confidence = winner approvals / total proposals, plus 0.2 when the winner
/// holds at least two approvals, capped at 1. No approvals at all falls back
/// to majority, with the result otherwise identical to [`majority_vote`].
pub fn approval_vote(ballot: &Ballot<'_>) -> VoteTally {
    let mut approvals: BTreeMap<&str, f64> = BTreeMap::new();
    for p in ballot.proposals {
        if is_approved(ballot.score(p), p.confidence()) {
            *approvals.entry(p.winner_choice()).or_insert(0.0) += 1.0;
        }
    }

    if approvals.is_empty() {
        warn!("Approval vote has no approvals, using majority");
        return VoteTally {
            method: ConsensusMethod::Approval,
            fallback_applied: true,
            ..majority_vote(ballot.proposals)
        };
    }

    let (winner, count) = pick_winner(&approvals, ballot.proposals);
    let ratio = count / ballot.proposals.len() as f64;
    let bonus = if count >= 2.0 { APPROVAL_BONUS } else { 0.0 };
    VoteTally {
        winner,
        base_confidence: (ratio + bonus).min(1.0),
        method: ConsensusMethod::Approval,
        fallback_applied: false,
    }
}
