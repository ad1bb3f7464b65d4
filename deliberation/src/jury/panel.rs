//! Convergence panel: the in-process jury.
//!
//! One juror is seated per proposal. Each round:
//!
//! 1. every juror contributes a discussion entry
//! 2. undecided jurors question, then lean to the current majority
//! 3. minority jurors less confident than the majority's mean concede
//!    (switch side, confidence × 0.9); the rest challenge
//!
//! The panel converges when all jurors hold the same definite position and
//! hangs when a round changes nothing or rounds run out. The whole run is
//! deterministic for a given proposal set.

use async_trait::async_trait;
use tracing::{debug, info};

use super::types::{
    JurorOpinion, JurorPosition, JuryDeliberation, JuryError, JuryPhase, JuryRound,
};
use crate::consensus::ConsensusResult;
use crate::events::{DeliberationPhase, EventSink, MessageType, ProgressEvent};
use crate::proposal::parsing::truncate_chars;
use crate::proposal::{AgentProposal, DisputeInput};

/// Default cap on jury rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;
/// Confidence multiplier applied to a conceding juror.
pub const CONCESSION_FACTOR: f64 = 0.9;

const MAX_JUROR_REASONING_CHARS: usize = 400;
const MAX_KEY_ARGUMENTS: usize = 3;

/// A jury implementation.
#[async_trait]
pub trait JuryProcess: Send + Sync {
    async fn deliberate(
        &self,
        input: &DisputeInput,
        proposals: &[AgentProposal],
        consensus: &ConsensusResult,
        sink: &dyn EventSink,
    ) -> Result<JuryDeliberation, JuryError>;
}

#[derive(Debug, Clone)]
pub struct ConvergencePanel {
    max_rounds: u32,
}

impl ConvergencePanel {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// One juror per proposal.
    pub fn seat_jurors(input: &DisputeInput, proposals: &[AgentProposal]) -> Vec<JurorOpinion> {
        proposals
            .iter()
            .enumerate()
            .map(|(i, p)| JurorOpinion {
                juror_id: format!("juror-{}", i + 1),
                name: p.rater_name().to_string(),
                current_position: JurorPosition::from_choice(
                    p.winner_choice(),
                    &input.party_a,
                    &input.party_b,
                ),
                confidence_level: p.confidence(),
                reasoning: truncate_chars(p.rationale(), MAX_JUROR_REASONING_CHARS),
                key_arguments: p.evidence().iter().take(MAX_KEY_ARGUMENTS).cloned().collect(),
                concerns: Vec::new(),
            })
            .collect()
    }

    /// Run the rounds synchronously.
    pub fn run(
        &self,
        subject_id: &str,
        jurors: Vec<JurorOpinion>,
        sink: &dyn EventSink,
    ) -> Result<JuryDeliberation, JuryError> {
        if jurors.is_empty() {
            return Err(JuryError::NoJurors);
        }
        let mut jury = JuryDeliberation::new(subject_id, jurors, self.max_rounds);
        let initial_minority = match majority_side(&jury.final_jurors) {
            Some(side) => jury
                .final_jurors
                .iter()
                .filter(|j| j.current_position == side.opposite())
                .count(),
            None => 0,
        };

        if all_agree(&jury.final_jurors) {
            jury.transition(JuryPhase::Converged, "jurors seated in agreement")?;
        }

        while !jury.is_complete() {
            let round = jury.round_count() + 1;
            jury.transition(JuryPhase::Discussing, &format!("round {round}"))?;
            let record = self.run_round(&mut jury, round);
            let changed = record.positions_changed;

            sink.emit(
                ProgressEvent::new(
                    subject_id,
                    DeliberationPhase::Jury,
                    MessageType::Vote,
                    format!(
                        "Round {round}: A={} B={} undecided={} changed={changed}",
                        record.votes_a, record.votes_b, record.undecided
                    ),
                )
                .with_round(round),
            );
            jury.rounds.push(record);
            jury.transition(JuryPhase::Voting, "positions recorded")?;

            if all_agree(&jury.final_jurors) {
                jury.transition(JuryPhase::Converged, "all jurors agree")?;
            } else if changed == 0 {
                jury.transition(JuryPhase::Hung, "no position changed")?;
            } else if round >= self.max_rounds {
                jury.transition(JuryPhase::Hung, "round limit reached")?;
            }
        }

        jury.stats.convergence_rate = if initial_minority == 0 {
            if jury.stats.concessions > 0 { 1.0 } else { 0.0 }
        } else {
            (jury.stats.concessions as f64 / initial_minority as f64).min(1.0)
        };
        jury.unanimous_decision = all_agree(&jury.final_jurors);
        jury.final_verdict = if jury.unanimous_decision {
            jury.final_jurors[0].current_position
        } else {
            majority_side(&jury.final_jurors).unwrap_or(JurorPosition::Undecided)
        };

        info!(
            jury_id = %jury.id,
            phase = %jury.phase,
            rounds = jury.round_count(),
            verdict = %jury.final_verdict,
            concessions = jury.stats.concessions,
            "Jury deliberation finished"
        );
        Ok(jury)
    }

    fn run_round(&self, jury: &mut JuryDeliberation, round: u32) -> JuryRound {
        let majority = majority_side(&jury.final_jurors);
        let majority_mean = majority
            .map(|side| {
                let confs: Vec<f64> = jury
                    .final_jurors
                    .iter()
                    .filter(|j| j.current_position == side)
                    .map(|j| j.confidence_level)
                    .collect();
                confs.iter().sum::<f64>() / confs.len().max(1) as f64
            })
            .unwrap_or(0.0);

        let mut entries = Vec::new();
        let mut changed = 0u32;
        let stats = &mut jury.stats;

        for juror in jury.final_jurors.iter_mut() {
            stats.discussions += 1;
            entries.push(format!(
                "{} ({}): {}",
                juror.name,
                juror.current_position,
                truncate_chars(&juror.reasoning, 120)
            ));

            match (juror.current_position, majority) {
                (JurorPosition::Undecided, Some(side)) => {
                    stats.questions += 1;
                    juror.current_position = side;
                    juror.concerns.push(format!("Leaned {side} in round {round}"));
                    changed += 1;
                }
                (JurorPosition::Undecided, None) => {
                    stats.questions += 1;
                }
                (position, Some(side)) if position != side => {
                    if juror.confidence_level < majority_mean {
                        stats.concessions += 1;
                        juror.current_position = side;
                        juror.confidence_level *= CONCESSION_FACTOR;
                        juror.concerns.push(format!("Conceded in round {round}"));
                        changed += 1;
                    } else {
                        stats.challenges += 1;
                    }
                }
                (_, None) => {
                    stats.challenges += 1;
                }
                _ => {}
            }
        }

        let count = |p: JurorPosition| {
            jury.final_jurors
                .iter()
                .filter(|j| j.current_position == p)
                .count() as u32
        };
        let record = JuryRound {
            round,
            entries,
            positions_changed: changed,
            votes_a: count(JurorPosition::A),
            votes_b: count(JurorPosition::B),
            undecided: count(JurorPosition::Undecided),
        };
        debug!(round, changed, votes_a = record.votes_a, votes_b = record.votes_b, "Jury round");
        record
    }
}

impl Default for ConvergencePanel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

#[async_trait]
impl JuryProcess for ConvergencePanel {
    async fn deliberate(
        &self,
        input: &DisputeInput,
        proposals: &[AgentProposal],
        _consensus: &ConsensusResult,
        sink: &dyn EventSink,
    ) -> Result<JuryDeliberation, JuryError> {
        let jurors = Self::seat_jurors(input, proposals);
        self.run(&input.subject_id, jurors, sink)
    }
}

fn all_agree(jurors: &[JurorOpinion]) -> bool {
    match jurors.first() {
        Some(first) => {
            first.current_position.is_definite()
                && jurors
                    .iter()
                    .all(|j| j.current_position == first.current_position)
        }
        None => false,
    }
}

/// Side with more definite votes; a count tie goes to the higher summed
/// confidence. `None` on a full tie or no definite votes.
fn majority_side(jurors: &[JurorOpinion]) -> Option<JurorPosition> {
    let tally = |p: JurorPosition| {
        jurors
            .iter()
            .filter(|j| j.current_position == p)
            .fold((0usize, 0.0f64), |(n, s), j| (n + 1, s + j.confidence_level))
    };
    let (a, sa) = tally(JurorPosition::A);
    let (b, sb) = tally(JurorPosition::B);
    if a > b {
        Some(JurorPosition::A)
    } else if b > a {
        Some(JurorPosition::B)
    } else if a == 0 {
        None
    } else if sa > sb {
        Some(JurorPosition::A)
    } else if sb > sa {
        Some(JurorPosition::B)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullSink, RecordingSink};
    use crate::proposal::RaterProfile;

    fn input() -> DisputeInput {
        DisputeInput::new("s1", "Who?", "acme", "globex")
    }

    fn p(rater: &str, winner: &str, confidence: f64) -> AgentProposal {
        AgentProposal::builder(&RaterProfile::new(rater, rater, "mock"), "s1")
            .winner(winner)
            .confidence(confidence)
            .rationale(format!("{rater} argues for {winner}"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_low_confidence_minority_concedes() {
        let proposals = vec![p("r1", "acme", 0.8), p("r2", "acme", 0.8), p("r3", "globex", 0.5)];
        let jurors = ConvergencePanel::seat_jurors(&input(), &proposals);
        let jury = ConvergencePanel::new(5).run("s1", jurors, &NullSink).unwrap();

        assert_eq!(jury.phase, JuryPhase::Converged);
        assert!(jury.unanimous_decision);
        assert_eq!(jury.final_verdict, JurorPosition::A);
        assert_eq!(jury.stats.concessions, 1);
        assert_eq!(jury.stats.convergence_rate, 1.0);
        assert!((jury.final_jurors[2].confidence_level - 0.45).abs() < 1e-9);
        assert_eq!(jury.round_count(), 1);
    }

    #[test]
    fn test_confident_minority_hangs_jury() {
        let proposals = vec![p("r1", "acme", 0.6), p("r2", "acme", 0.6), p("r3", "globex", 0.9)];
        let jurors = ConvergencePanel::seat_jurors(&input(), &proposals);
        let jury = ConvergencePanel::new(5).run("s1", jurors, &NullSink).unwrap();

        assert_eq!(jury.phase, JuryPhase::Hung);
        assert!(!jury.unanimous_decision);
        assert_eq!(jury.final_verdict, JurorPosition::A);
        assert_eq!(jury.stats.challenges, 1);
        assert_eq!(jury.stats.convergence_rate, 0.0);
    }

    #[test]
    fn test_unknown_choice_seats_undecided_and_leans() {
        let proposals = vec![p("r1", "acme", 0.7), p("r2", "acme", 0.7), p("r3", "initech", 0.9)];
        let jurors = ConvergencePanel::seat_jurors(&input(), &proposals);
        assert_eq!(jurors[2].current_position, JurorPosition::Undecided);
        let jury = ConvergencePanel::new(5).run("s1", jurors, &NullSink).unwrap();
        assert_eq!(jury.phase, JuryPhase::Converged);
        assert_eq!(jury.stats.questions, 1);
        assert_eq!(jury.stats.concessions, 0);
    }

    #[test]
    fn test_agreement_at_seating_needs_no_rounds() {
        let proposals = vec![p("r1", "globex", 0.7), p("r2", "globex", 0.6)];
        let jurors = ConvergencePanel::seat_jurors(&input(), &proposals);
        let jury = ConvergencePanel::new(5).run("s1", jurors, &NullSink).unwrap();
        assert_eq!(jury.phase, JuryPhase::Converged);
        assert_eq!(jury.round_count(), 0);
        assert_eq!(jury.final_verdict, JurorPosition::B);
    }

    #[test]
    fn test_empty_panel_is_error() {
        assert_eq!(
            ConvergencePanel::default().run("s1", vec![], &NullSink).unwrap_err(),
            JuryError::NoJurors
        );
    }

    #[tokio::test]
    async fn test_deliberate_emits_vote_events() {
        let proposals = vec![p("r1", "acme", 0.8), p("r2", "globex", 0.8), p("r3", "globex", 0.4)];
        let sink = RecordingSink::new();
        let consensus = crate::consensus::ConsensusSynthesizer::new()
            .decide(
                &proposals,
                &[],
                crate::consensus::ConsensusMethod::Majority,
                &Default::default(),
            )
            .unwrap();
        let jury = ConvergencePanel::new(3)
            .deliberate(&input(), &proposals, &consensus, &sink)
            .await
            .unwrap();
        assert!(jury.is_complete());
        assert_eq!(sink.count_of(MessageType::Vote), jury.round_count() as usize);
        assert!(sink.events().iter().all(|e| e.metadata.round.is_some()));
    }
}
