//! Progress event types emitted during a deliberation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::TokenUsage;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliberationPhase {
    Started,
    Proposing,
    Judging,
    Synthesizing,
    Jury,
    Completed,
    Failed,
}

impl std::fmt::Display for DeliberationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Proposing => write!(f, "proposing"),
            Self::Judging => write!(f, "judging"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Jury => write!(f, "jury"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Kind of message carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Proposal,
    Evaluation,
    Comparison,
    Vote,
    Synthesis,
    Progress,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Evaluation => "evaluation",
            Self::Comparison => "comparison",
            Self::Vote => "vote",
            Self::Synthesis => "synthesis",
            Self::Progress => "progress",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            token_usage: None,
            processing_time_ms: None,
            round: None,
        }
    }
}

/// A progress record for external observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub subject_id: String,
    pub phase: DeliberationPhase,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: EventMetadata,
}

impl ProgressEvent {
    pub fn new(
        subject_id: impl Into<String>,
        phase: DeliberationPhase,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            phase,
            message_type,
            content: content.into(),
            metadata: EventMetadata::default(),
        }
    }

    /// Shorthand for a `progress` message.
    pub fn progress(
        subject_id: impl Into<String>,
        phase: DeliberationPhase,
        content: impl Into<String>,
    ) -> Self {
        Self::new(subject_id, phase, MessageType::Progress, content)
    }

    pub fn with_tokens(mut self, usage: TokenUsage) -> Self {
        self.metadata.token_usage = Some(usage);
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.metadata.processing_time_ms = Some(ms);
        self
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.metadata.round = Some(round);
        self
    }
}
