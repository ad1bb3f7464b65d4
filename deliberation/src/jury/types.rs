//! Jury state machine, participants and records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors inside a jury run. Never surfaced past the orchestrator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JuryError {
    #[error("No jurors seated")]
    NoJurors,

    #[error("Invalid jury transition {from} → {to}")]
    InvalidTransition { from: JuryPhase, to: JuryPhase },

    #[error("Juror {0} has a non-finite confidence")]
    InvalidConfidence(String),
}

/// Phase of a jury deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JuryPhase {
    /// Jurors seated from proposals.
    Seated,
    /// Jurors exchange arguments.
    Discussing,
    /// Positions recorded for the round.
    Voting,
    /// All jurors agree.
    Converged,
    /// Rounds exhausted or positions stopped moving.
    Hung,
}

impl JuryPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Hung)
    }

    pub fn valid_transitions(self) -> &'static [JuryPhase] {
        match self {
            Self::Seated => &[Self::Discussing, Self::Converged, Self::Hung],
            Self::Discussing => &[Self::Voting],
            Self::Voting => &[Self::Discussing, Self::Converged, Self::Hung],
            Self::Converged | Self::Hung => &[],
        }
    }
}

impl std::fmt::Display for JuryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seated => write!(f, "seated"),
            Self::Discussing => write!(f, "discussing"),
            Self::Voting => write!(f, "voting"),
            Self::Converged => write!(f, "converged"),
            Self::Hung => write!(f, "hung"),
        }
    }
}

/// A juror's stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurorPosition {
    A,
    B,
    Undecided,
}

impl JurorPosition {
    pub fn is_definite(self) -> bool {
        !matches!(self, Self::Undecided)
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
            Self::Undecided => Self::Undecided,
        }
    }

    /// Position for a choice, given the two party identifiers.
    pub fn from_choice(choice: &str, party_a: &str, party_b: &str) -> Self {
        if choice == party_a {
            Self::A
        } else if choice == party_b {
            Self::B
        } else {
            Self::Undecided
        }
    }

    /// Party identifier for a definite position.
    pub fn to_choice<'a>(self, party_a: &'a str, party_b: &'a str) -> Option<&'a str> {
        match self {
            Self::A => Some(party_a),
            Self::B => Some(party_b),
            Self::Undecided => None,
        }
    }
}

impl std::fmt::Display for JurorPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Undecided => write!(f, "undecided"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurorOpinion {
    pub juror_id: String,
    pub name: String,
    pub current_position: JurorPosition,
    pub confidence_level: f64,
    pub reasoning: String,
    pub key_arguments: Vec<String>,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliberationStats {
    pub discussions: u32,
    pub questions: u32,
    pub challenges: u32,
    pub concessions: u32,
    pub convergence_rate: f64,
}

/// One discussion round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryRound {
    pub round: u32,
    pub entries: Vec<String>,
    pub positions_changed: u32,
    pub votes_a: u32,
    pub votes_b: u32,
    pub undecided: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryTransition {
    pub from: JuryPhase,
    pub to: JuryPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Full record of a jury run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryDeliberation {
    pub id: String,
    pub subject_id: String,
    pub phase: JuryPhase,
    pub max_rounds: u32,
    pub rounds: Vec<JuryRound>,
    pub unanimous_decision: bool,
    pub final_verdict: JurorPosition,
    pub initial_jurors: Vec<JurorOpinion>,
    pub final_jurors: Vec<JurorOpinion>,
    pub stats: DeliberationStats,
    pub transitions: Vec<JuryTransition>,
}

impl JuryDeliberation {
    pub fn new(subject_id: &str, jurors: Vec<JurorOpinion>, max_rounds: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            phase: JuryPhase::Seated,
            max_rounds,
            rounds: Vec::new(),
            unanimous_decision: false,
            final_verdict: JurorPosition::Undecided,
            final_jurors: jurors.clone(),
            initial_jurors: jurors,
            stats: DeliberationStats::default(),
            transitions: Vec::new(),
        }
    }

    pub fn transition(&mut self, to: JuryPhase, reason: &str) -> Result<(), JuryError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(JuryError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(JuryTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    pub fn round_count(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// A juror who disagrees with the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissent {
    pub juror_id: String,
    pub name: String,
    pub position: JurorPosition,
    pub reasoning: String,
}

/// Judgement over a finished deliberation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryOutcome {
    pub verdict: JurorPosition,
    pub confidence: f64,
    pub unanimous: bool,
    pub rounds: u32,
    pub dissenters: Vec<Dissent>,
    pub deliberation_quality: f64,
    /// Set when the jury could not be evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl JuryOutcome {
    /// Zero-confidence undecided result.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            verdict: JurorPosition::Undecided,
            confidence: 0.0,
            unanimous: false,
            rounds: 0,
            dissenters: Vec::new(),
            deliberation_quality: 0.0,
            failure: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}
