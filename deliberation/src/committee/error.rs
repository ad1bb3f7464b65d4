use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::consensus::SynthesisError;

#[derive(Debug, Error)]
pub enum CommitteeError {
    /// Malformed configuration or input, raised before any external call.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Subject {subject_id} is already being decided or cooling down")]
    AlreadyRunning { subject_id: String },

    #[error("Insufficient proposals: got {got}, need {need}")]
    InsufficientProposals { got: usize, need: usize },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("Deliberation exceeded {0:?}")]
    Timeout(Duration),
}

impl From<ConfigError> for CommitteeError {
    fn from(e: ConfigError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl CommitteeError {
    /// Whether the caller may retry once the subject's cooldown expires.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. } | Self::InsufficientProposals { .. } | Self::Timeout(_)
        )
    }
}

pub type CommitteeResult<T> = Result<T, CommitteeError>;
