//! Verdict evaluation over a finished jury.
//!
//! Unanimous, definite verdicts get a confidence boost; divided juries are
//! scaled down by the share of jurors in the majority. Any internal problem
//! yields [`JuryOutcome::failed`] instead of an error.

use tracing::{debug, warn};

use super::types::{
    Dissent, JurorOpinion, JurorPosition, JuryDeliberation, JuryError, JuryOutcome,
};

const ROUND_PENALTY_PER_ROUND: f64 = 0.05;
const MAX_ROUND_PENALTY: f64 = 0.3;
const UNANIMITY_BONUS: f64 = 0.2;
const CONVERGENCE_BONUS: f64 = 0.1;

/// Evaluates a deliberation into a verdict and confidence.
#[derive(Debug, Clone, Default)]
pub struct UnanimousConsensus;

impl UnanimousConsensus {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, jury: &JuryDeliberation) -> JuryOutcome {
        match self.try_evaluate(jury) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(jury_id = %jury.id, error = %e, "Jury evaluation failed");
                JuryOutcome::failed(e.to_string())
            }
        }
    }

    fn try_evaluate(&self, jury: &JuryDeliberation) -> Result<JuryOutcome, JuryError> {
        let jurors = &jury.final_jurors;
        if jurors.is_empty() {
            return Err(JuryError::NoJurors);
        }
        if let Some(bad) = jurors.iter().find(|j| !j.confidence_level.is_finite()) {
            return Err(JuryError::InvalidConfidence(bad.juror_id.clone()));
        }

        let rounds = jury.round_count();
        let penalty = round_penalty(rounds);
        let quality = deliberation_quality(jury);

        // The record's own flags decide the branch; jurors are recounted only
        // for a divided panel.
        let unanimous = jury.unanimous_decision && jury.final_verdict.is_definite();

        let (verdict, confidence) = if unanimous {
            let confidence = mean_confidence(jurors.iter()) - penalty
                + UNANIMITY_BONUS
                + jury.stats.convergence_rate * CONVERGENCE_BONUS;
            (jury.final_verdict, confidence.clamp(0.1, 1.0))
        } else {
            let verdict = divided_verdict(jurors);
            let confidence = if verdict.is_definite() {
                let majority: Vec<&JurorOpinion> =
                    jurors.iter().filter(|j| j.current_position == verdict).collect();
                let share = majority.len() as f64 / jurors.len() as f64;
                (mean_confidence(majority.into_iter()) * share - penalty).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (verdict, confidence)
        };

        let dissenters = jurors
            .iter()
            .filter(|j| j.current_position != verdict)
            .map(|j| Dissent {
                juror_id: j.juror_id.clone(),
                name: j.name.clone(),
                position: j.current_position,
                reasoning: j.reasoning.clone(),
            })
            .collect();

        debug!(
            jury_id = %jury.id,
            %verdict,
            confidence,
            unanimous,
            rounds,
            quality,
            "Jury evaluated"
        );

        Ok(JuryOutcome {
            verdict,
            confidence,
            unanimous,
            rounds,
            dissenters,
            deliberation_quality: quality,
            failure: None,
        })
    }
}

/// min(0.3, rounds × 0.05)
pub fn round_penalty(rounds: u32) -> f64 {
    (rounds as f64 * ROUND_PENALTY_PER_ROUND).min(MAX_ROUND_PENALTY)
}

/// Mean of saturated discussion, question and challenge counts.
pub fn deliberation_quality(jury: &JuryDeliberation) -> f64 {
    let s = &jury.stats;
    let discussion = (s.discussions as f64 / 30.0).min(1.0);
    let questions = (s.questions as f64 / 10.0).min(1.0);
    let challenges = (s.challenges as f64 / 5.0).min(1.0);
    (discussion + questions + challenges) / 3.0
}

fn mean_confidence<'a>(jurors: impl Iterator<Item = &'a JurorOpinion>) -> f64 {
    let (sum, n) = jurors.fold((0.0, 0usize), |(s, n), j| (s + j.confidence_level, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Strict majority with at least two votes; a count tie goes to the side with
/// the higher summed confidence.
pub fn divided_verdict(jurors: &[JurorOpinion]) -> JurorPosition {
    let side = |p: JurorPosition| jurors.iter().filter(move |j| j.current_position == p);
    let (a, b) = (side(JurorPosition::A).count(), side(JurorPosition::B).count());
    let sum = |p: JurorPosition| side(p).map(|j| j.confidence_level).sum::<f64>();

    if a > b && a >= 2 {
        JurorPosition::A
    } else if b > a && b >= 2 {
        JurorPosition::B
    } else if a == b && a >= 2 {
        let (sa, sb) = (sum(JurorPosition::A), sum(JurorPosition::B));
        if sa > sb {
            JurorPosition::A
        } else if sb > sa {
            JurorPosition::B
        } else {
            JurorPosition::Undecided
        }
    } else {
        JurorPosition::Undecided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jury::types::DeliberationStats;

    fn juror(id: &str, position: JurorPosition, confidence: f64) -> JurorOpinion {
        JurorOpinion {
            juror_id: id.to_string(),
            name: id.to_uppercase(),
            current_position: position,
            confidence_level: confidence,
            reasoning: format!("{id} reasoning"),
            key_arguments: vec![],
            concerns: vec![],
        }
    }

    /// Record with the flags a panel would set for `jurors`.
    fn jury(jurors: Vec<JurorOpinion>, rounds: u32) -> JuryDeliberation {
        let first = jurors.first().map(|j| j.current_position);
        let agreed = first
            .filter(|p| p.is_definite() && jurors.iter().all(|j| j.current_position == *p));
        let mut j = JuryDeliberation::new("s", jurors, 5);
        if let Some(position) = agreed {
            j.unanimous_decision = true;
            j.final_verdict = position;
        }
        for round in 1..=rounds {
            j.rounds.push(crate::jury::types::JuryRound {
                round,
                entries: vec![],
                positions_changed: 0,
                votes_a: 0,
                votes_b: 0,
                undecided: 0,
            });
        }
        j
    }

    #[test]
    fn test_unanimous_confidence() {
        let mut j = jury(
            vec![
                juror("j1", JurorPosition::A, 0.8),
                juror("j2", JurorPosition::A, 0.6),
            ],
            2,
        );
        j.stats.convergence_rate = 1.0;
        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert!(outcome.unanimous);
        assert_eq!(outcome.verdict, JurorPosition::A);
        // 0.7 − 0.1 + 0.2 + 0.1
        assert!((outcome.confidence - 0.9).abs() < 1e-9);
        assert!(outcome.dissenters.is_empty());
    }

    #[test]
    fn test_divided_confidence_and_dissent() {
        let j = jury(
            vec![
                juror("j1", JurorPosition::A, 0.8),
                juror("j2", JurorPosition::A, 0.6),
                juror("j3", JurorPosition::B, 0.9),
            ],
            1,
        );
        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert_eq!(outcome.verdict, JurorPosition::A);
        // 0.7 × 2/3 − 0.05
        assert!((outcome.confidence - (0.7 * 2.0 / 3.0 - 0.05)).abs() < 1e-9);
        assert_eq!(outcome.dissenters.len(), 1);
        assert_eq!(outcome.dissenters[0].juror_id, "j3");
    }

    #[test]
    fn test_unanimous_beats_divided() {
        let unanimous = jury(
            vec![
                juror("j1", JurorPosition::A, 0.7),
                juror("j2", JurorPosition::A, 0.7),
                juror("j3", JurorPosition::A, 0.7),
            ],
            3,
        );
        let divided = jury(
            vec![
                juror("j1", JurorPosition::A, 0.7),
                juror("j2", JurorPosition::A, 0.7),
                juror("j3", JurorPosition::B, 0.7),
            ],
            3,
        );
        let judge = UnanimousConsensus::new();
        assert!(judge.evaluate(&unanimous).confidence > judge.evaluate(&divided).confidence);
    }

    #[test]
    fn test_declared_unanimity_takes_unanimous_branch() {
        let mut j = jury(
            vec![
                juror("j1", JurorPosition::A, 0.8),
                juror("j2", JurorPosition::A, 0.8),
                juror("j3", JurorPosition::Undecided, 0.8),
            ],
            0,
        );
        j.unanimous_decision = true;
        j.final_verdict = JurorPosition::A;

        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert!(outcome.unanimous);
        assert_eq!(outcome.verdict, JurorPosition::A);
        // 0.8 + 0.2
        assert!((outcome.confidence - 1.0).abs() < 1e-9);
        assert_eq!(outcome.dissenters.len(), 1);
        assert_eq!(outcome.dissenters[0].juror_id, "j3");
    }

    #[test]
    fn test_undeclared_agreement_stays_divided() {
        let mut j = jury(
            vec![
                juror("j1", JurorPosition::B, 0.8),
                juror("j2", JurorPosition::B, 0.8),
            ],
            0,
        );
        j.unanimous_decision = false;
        j.final_verdict = JurorPosition::B;

        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert!(!outcome.unanimous);
        assert_eq!(outcome.verdict, JurorPosition::B);
        // 0.8 × 2/2, no bonus
        assert!((outcome.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_unanimous_flag_without_definite_verdict_is_divided() {
        let mut j = jury(
            vec![
                juror("j1", JurorPosition::A, 0.9),
                juror("j2", JurorPosition::Undecided, 0.5),
            ],
            0,
        );
        j.unanimous_decision = true;
        j.final_verdict = JurorPosition::Undecided;

        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert!(!outcome.unanimous);
        assert_eq!(outcome.verdict, JurorPosition::Undecided);
    }

    #[test]
    fn test_count_tie_uses_summed_confidence() {
        let jurors = vec![
            juror("j1", JurorPosition::A, 0.5),
            juror("j2", JurorPosition::A, 0.5),
            juror("j3", JurorPosition::B, 0.9),
            juror("j4", JurorPosition::B, 0.9),
        ];
        assert_eq!(divided_verdict(&jurors), JurorPosition::B);
    }

    #[test]
    fn test_single_vote_is_undecided() {
        let j = jury(
            vec![
                juror("j1", JurorPosition::A, 0.9),
                juror("j2", JurorPosition::Undecided, 0.5),
            ],
            1,
        );
        let outcome = UnanimousConsensus::new().evaluate(&j);
        assert_eq!(outcome.verdict, JurorPosition::Undecided);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_failures_are_soft() {
        let empty = jury(vec![], 0);
        assert!(UnanimousConsensus::new().evaluate(&empty).is_failed());

        let nan = jury(vec![juror("j1", JurorPosition::A, f64::NAN)], 0);
        let outcome = UnanimousConsensus::new().evaluate(&nan);
        assert!(outcome.is_failed());
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_quality_saturates() {
        let mut j = jury(vec![juror("j1", JurorPosition::A, 0.5)], 0);
        j.stats = DeliberationStats {
            discussions: 60,
            questions: 5,
            challenges: 0,
            ..Default::default()
        };
        assert!((deliberation_quality(&j) - 0.5).abs() < 1e-9);
    }
}
