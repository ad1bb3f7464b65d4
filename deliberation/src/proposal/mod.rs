//! Proposals: raters, their opinions, and how opinions are produced.

pub mod parsing;
pub mod pool;
pub mod types;

pub use parsing::{parse_proposal_response, ParsedOpinion};
pub use pool::{attempt_temperature, ProposerPool};
pub use types::{
    AgentProposal, DisputeInput, GenerationMetadata, ProposalBuilder, ProposalError,
    RaterProfile, MAX_RATER_WEIGHT, MIN_RATER_WEIGHT,
};
