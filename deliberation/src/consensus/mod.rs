//! Consensus synthesis
//!
//! Turns judged proposals into one calibrated answer. Four voting methods are
//! supported (majority, Borda, weighted, approval); all of them feed the same
//! calibration so `confidence_level + residual_uncertainty == 1`.

pub mod evidence;
pub mod metrics;
pub mod reasoning;
pub mod synthesizer;
pub mod types;
pub mod voting;

pub use reasoning::{
    GeneratedReasoning, Narrative, ReasoningContext, ReasoningWriter, TemplateReasoning,
};
pub use synthesizer::{ConsensusSynthesizer, DEFAULT_HUMAN_REVIEW_THRESHOLD};
pub use types::{
    AlternativeChoice, ConsensusMethod, ConsensusMetrics, ConsensusResult, QualityFlags,
    SynthesisError, SynthesisResult,
};
pub use voting::{Ballot, VoteTally};
