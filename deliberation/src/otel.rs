//! OpenTelemetry-style span helpers for the deliberation pipeline.
//!
//! Field names use dot notation so a tracing-opentelemetry layer can export
//! them unchanged.
//!
//! ```text
//! committee.deliberation        (root, one per dispute)
//!   ├─ committee.proposal       (one per rater attempt)
//!   ├─ committee.judge          (rule-based or pairwise scoring)
//!   ├─ committee.synthesis      (voting + calibration)
//!   └─ committee.jury           (fallback deliberation)
//! ```

use tracing::Span;

// ── Span Names ───────────────────────────────────────────────────────

pub const SPAN_DELIBERATION: &str = "committee.deliberation";
pub const SPAN_PROPOSAL: &str = "committee.proposal";
pub const SPAN_JUDGE: &str = "committee.judge";
pub const SPAN_SYNTHESIS: &str = "committee.synthesis";
pub const SPAN_JURY: &str = "committee.jury";

// ── Field Names ──────────────────────────────────────────────────────

pub const FIELD_SUBJECT_ID: &str = "subject.id";
pub const FIELD_RATER_ID: &str = "committee.rater.id";
pub const FIELD_PROVIDER: &str = "committee.provider";
pub const FIELD_ATTEMPT: &str = "committee.attempt";
pub const FIELD_JUDGE_MODE: &str = "committee.judge.mode";
pub const FIELD_METHOD: &str = "committee.consensus.method";
pub const FIELD_PROPOSAL_COUNT: &str = "committee.proposal_count";
pub const FIELD_WINNER: &str = "committee.winner";
pub const FIELD_CONFIDENCE: &str = "committee.confidence";
pub const FIELD_JURY_ROUNDS: &str = "committee.jury.rounds";
pub const FIELD_ESCALATED: &str = "committee.escalated";
pub const FIELD_SUCCESS: &str = "committee.success";
pub const FIELD_DURATION_MS: &str = "committee.duration_ms";
pub const FIELD_TOKENS_USED: &str = "committee.tokens_used";

// ── Span Builders ────────────────────────────────────────────────────

/// Root span for one dispute.
///
/// Filled later via [`record_deliberation_result`]: winner, confidence,
/// escalation, success, duration, tokens.
pub fn deliberation_span(subject_id: &str, method: &str) -> Span {
    tracing::info_span!(
        "committee.deliberation",
        "subject.id" = %subject_id,
        "committee.consensus.method" = %method,
        "committee.winner" = tracing::field::Empty,
        "committee.confidence" = tracing::field::Empty,
        "committee.escalated" = tracing::field::Empty,
        "committee.success" = tracing::field::Empty,
        "committee.duration_ms" = tracing::field::Empty,
        "committee.tokens_used" = tracing::field::Empty,
    )
}

pub fn record_deliberation_result(
    span: &Span,
    winner: &str,
    confidence: f64,
    escalated: bool,
    duration_ms: u64,
    tokens_used: u64,
) {
    span.record("committee.winner", winner);
    span.record("committee.confidence", confidence);
    span.record("committee.escalated", escalated);
    span.record("committee.success", true);
    span.record("committee.duration_ms", duration_ms);
    span.record("committee.tokens_used", tokens_used);
}

/// Mark a root span as failed.
pub fn record_deliberation_failure(span: &Span, duration_ms: u64) {
    span.record("committee.success", false);
    span.record("committee.duration_ms", duration_ms);
}

/// Span for one rater attempt.
pub fn proposal_span(subject_id: &str, rater_id: &str, provider: &str, attempt: usize) -> Span {
    tracing::info_span!(
        "committee.proposal",
        "subject.id" = %subject_id,
        "committee.rater.id" = %rater_id,
        "committee.provider" = %provider,
        "committee.attempt" = attempt as u64,
        "committee.success" = tracing::field::Empty,
        "committee.duration_ms" = tracing::field::Empty,
        "committee.tokens_used" = tracing::field::Empty,
    )
}

pub fn record_proposal_result(span: &Span, success: bool, duration_ms: u64, tokens_used: u64) {
    span.record("committee.success", success);
    span.record("committee.duration_ms", duration_ms);
    span.record("committee.tokens_used", tokens_used);
}

pub fn judge_span(subject_id: &str, mode: &str, proposal_count: usize) -> Span {
    tracing::info_span!(
        "committee.judge",
        "subject.id" = %subject_id,
        "committee.judge.mode" = %mode,
        "committee.proposal_count" = proposal_count as u64,
        "committee.duration_ms" = tracing::field::Empty,
    )
}

pub fn synthesis_span(subject_id: &str, method: &str, proposal_count: usize) -> Span {
    tracing::info_span!(
        "committee.synthesis",
        "subject.id" = %subject_id,
        "committee.consensus.method" = %method,
        "committee.proposal_count" = proposal_count as u64,
        "committee.winner" = tracing::field::Empty,
        "committee.confidence" = tracing::field::Empty,
    )
}

pub fn record_synthesis_result(span: &Span, winner: &str, confidence: f64) {
    span.record("committee.winner", winner);
    span.record("committee.confidence", confidence);
}

pub fn jury_span(subject_id: &str) -> Span {
    tracing::info_span!(
        "committee.jury",
        "subject.id" = %subject_id,
        "committee.jury.rounds" = tracing::field::Empty,
        "committee.confidence" = tracing::field::Empty,
        "committee.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_jury_result(span: &Span, rounds: u32, confidence: f64, duration_ms: u64) {
    span.record("committee.jury.rounds", rounds);
    span.record("committee.confidence", confidence);
    span.record("committee.duration_ms", duration_ms);
}

/// Record elapsed time on any span built here.
pub fn record_duration(span: &Span, duration_ms: u64) {
    span.record("committee.duration_ms", duration_ms);
}
