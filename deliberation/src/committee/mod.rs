//! Committee orchestration
//!
//! Ties proposals, judges, synthesis and the jury fallback into one decision
//! per dispute, gated by the [`DecisionCoordinator`](crate::coordinator::DecisionCoordinator).

pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::{CommitteeError, CommitteeResult};
pub use orchestrator::{CommitteeOrchestrator, CommitteeOrchestratorBuilder};
pub use types::{
    CommitteeDecision, DecisionDraft, DecisionMetrics, JuryReport, Stage, StageUsage,
};
