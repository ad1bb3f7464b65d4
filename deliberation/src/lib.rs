//! Committee Deliberation & Consensus Engine
//!
//! Independent raters propose a winner between two parties; proposals are
//! judged, synthesized into a calibrated consensus, and escalated to a jury
//! when the committee is contested.
//!
//! - [`proposal`]: rater pool, prompt building and response parsing
//! - [`judge`]: rule-based and pairwise (LLM) scoring
//! - [`consensus`]: voting methods, calibration, merged evidence
//! - [`jury`]: convergence panel and verdict evaluation
//! - [`coordinator`]: per-subject mutual exclusion and cooldown
//! - [`committee`]: the end-to-end orchestrator
//!
//! # Usage
//!
//! ```rust,ignore
//! use deliberation::{CommitteeConfig, CommitteeOrchestrator, DisputeInput, GeneratorRegistry};
//! use deliberation::events::TracingSink;
//!
//! let orchestrator = CommitteeOrchestrator::builder()
//!     .config(CommitteeConfig::load(None)?)
//!     .registry(GeneratorRegistry::from_env())
//!     .build()?;
//! let input = DisputeInput::new("dispute-42", "Who breached the contract?", "acme", "globex");
//! let decision = orchestrator.deliberate_and_decide(&input, &TracingSink).await?;
//! ```

pub mod committee;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod events;
pub mod generation;
pub mod judge;
pub mod jury;
pub mod otel;
pub mod persistence;
pub mod prompts;
pub mod proposal;

pub use committee::{CommitteeDecision, CommitteeError, CommitteeOrchestrator, CommitteeResult};
pub use config::{CommitteeConfig, ConfigError};
pub use consensus::{ConsensusMethod, ConsensusResult, ConsensusSynthesizer, SynthesisError};
pub use coordinator::DecisionCoordinator;
pub use events::{EventSink, ProgressEvent};
pub use generation::{GenerationError, GeneratorRegistry, TextGenerator};
pub use judge::{JudgeMode, PairwiseJudge, RuleBasedJudge};
pub use jury::{ConvergencePanel, JuryOutcome, UnanimousConsensus};
pub use persistence::{DecisionStore, JsonFileStore, MemoryStore, StoreError};
pub use proposal::{AgentProposal, DisputeInput, ProposerPool, RaterProfile};
