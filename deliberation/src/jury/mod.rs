//! Jury deliberation
//!
//! Fallback for contested decisions. A [`JuryProcess`] produces a
//! [`JuryDeliberation`] record; [`UnanimousConsensus`] turns that record into
//! a verdict with a confidence. Jury failures are never fatal to the
//! committee: they surface as a zero-confidence undecided outcome.

pub mod panel;
pub mod types;
pub mod verdict;

pub use panel::{ConvergencePanel, JuryProcess, DEFAULT_MAX_ROUNDS};
pub use types::{
    DeliberationStats, Dissent, JurorOpinion, JurorPosition, JuryDeliberation, JuryError,
    JuryOutcome, JuryPhase, JuryRound,
};
pub use verdict::UnanimousConsensus;
