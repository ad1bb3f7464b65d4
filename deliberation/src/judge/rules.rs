//! Rule-based judge.
//!
//! Scores a single proposal without any external call:
//!
//! ```text
//! overall = 0.35 × completeness + 0.35 × consistency + 0.30 × evidence_quality
//! ```
//!
//! Every sub-score is in [0, 1] and every deduction or award is recorded as a
//! finding so the score can be explained.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{Evaluation, EvaluationScores, JudgeMode};
use crate::proposal::AgentProposal;

const COMPLETENESS_WEIGHT: f64 = 0.35;
const CONSISTENCY_WEIGHT: f64 = 0.35;
const EVIDENCE_WEIGHT: f64 = 0.30;

/// Opposite word pairs that signal a self-contradicting rationale.
const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("certain", "uncertain"),
    ("clear", "unclear"),
    ("always", "never"),
    ("strong", "weak"),
    ("likely", "unlikely"),
    ("valid", "invalid"),
    ("complete", "incomplete"),
    ("confirmed", "unconfirmed"),
    ("agree", "disagree"),
    ("proves", "disproves"),
];

/// Keyword categories used to measure evidence diversity.
const EVIDENCE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "documentary",
        &["contract", "invoice", "receipt", "document", "record", "report", "letter", "email", "agreement"],
    ),
    (
        "temporal",
        &["date", "deadline", "january", "february", "march", "april", "may", "june", "july", "august", "september", "october", "november", "december", "timestamp"],
    ),
    (
        "quantitative",
        &["amount", "total", "percent", "price", "cost", "count", "$", "%"],
    ),
    (
        "testimonial",
        &["witness", "statement", "testified", "according to", "quote", "said", "stated"],
    ),
    (
        "procedural",
        &["clause", "section", "policy", "rule", "regulation", "term", "article"],
    ),
    (
        "digital",
        &["log", "hash", "transaction", "url", "http", "commit", "signature", "ledger"],
    ),
];

static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d").expect("NUMERIC_PATTERN regex should compile"));

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(#\w+|\b[A-Z]{2,}-?\d+\b|\b0x[0-9a-fA-F]+\b)")
        .expect("IDENTIFIER_PATTERN regex should compile")
});

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+").expect("WORD_PATTERN regex should compile"));

/// Deterministic proposal scorer.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedJudge;

impl RuleBasedJudge {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one proposal.
    pub fn evaluate(&self, proposal: &AgentProposal) -> Evaluation {
        let mut findings = Vec::new();
        let completeness = score_completeness(proposal, &mut findings);
        let consistency = score_consistency(proposal, &mut findings);
        let evidence_quality = score_evidence_quality(proposal.evidence(), &mut findings);
        let overall = (COMPLETENESS_WEIGHT * completeness
            + CONSISTENCY_WEIGHT * consistency
            + EVIDENCE_WEIGHT * evidence_quality)
            .clamp(0.0, 1.0);

        debug!(
            proposal_id = %proposal.id(),
            overall,
            completeness,
            consistency,
            evidence_quality,
            "Rule-based evaluation"
        );

        Evaluation {
            proposal_id: proposal.id().to_string(),
            rater_id: proposal.rater_id().to_string(),
            scores: EvaluationScores {
                overall,
                completeness,
                consistency,
                evidence_quality,
            },
            findings,
            mode: JudgeMode::RuleBased,
        }
    }

    pub fn evaluate_all(&self, proposals: &[AgentProposal]) -> Vec<Evaluation> {
        proposals.iter().map(|p| self.evaluate(p)).collect()
    }
}

// ── Completeness ───────────────────────────────────────────────────

/// Tiered partial credit, 0.25 per dimension.
pub fn score_completeness(proposal: &AgentProposal, findings: &mut Vec<String>) -> f64 {
    let confidence = proposal.confidence();
    let confidence_score = if confidence >= 0.7 {
        0.25
    } else if confidence >= 0.5 {
        0.15
    } else {
        findings.push(format!("Low confidence ({confidence:.2})"));
        0.05
    };

    let evidence_count = proposal.evidence().len();
    let evidence_score = match evidence_count {
        0 => {
            findings.push("No evidence cited".to_string());
            0.0
        }
        1 | 2 => 0.15 * (evidence_count as f64 / 2.0),
        _ => 0.25,
    };

    let rationale_len = proposal.rationale().chars().count();
    let rationale_score = if rationale_len >= 200 {
        0.25
    } else if rationale_len >= 100 {
        0.15
    } else if rationale_len >= 50 {
        0.08
    } else {
        findings.push(format!("Rationale is very short ({rationale_len} chars)"));
        0.0
    };

    let present = [
        proposal.winner_choice(),
        proposal.rater_id(),
        proposal.subject_id(),
    ]
    .iter()
    .filter(|f| !f.trim().is_empty())
    .count();
    let fields_score = 0.25 * present as f64 / 3.0;

    (confidence_score + evidence_score + rationale_score + fields_score).min(1.0)
}

// ── Consistency ────────────────────────────────────────────────────

/// Starts at 1.0 and deducts for internal mismatches. Token checks are skipped
/// when usage was not recorded (zero tokens).
pub fn score_consistency(proposal: &AgentProposal, findings: &mut Vec<String>) -> f64 {
    let confidence = proposal.confidence();
    let evidence_count = proposal.evidence().len();
    let rationale_len = proposal.rationale().chars().count();
    let mut score: f64 = 1.0;

    if confidence > 0.8 && evidence_count < 2 {
        score -= 0.2;
        findings.push("High confidence with little supporting evidence".to_string());
    }
    if evidence_count >= 3 && confidence < 0.4 {
        score -= 0.1;
        findings.push("Substantial evidence but low confidence".to_string());
    }
    if confidence > 0.8 && rationale_len < 100 {
        score -= 0.15;
        findings.push("High confidence with a short rationale".to_string());
    }

    let contradictions = find_contradictions(proposal.rationale());
    if !contradictions.is_empty() {
        let penalty = (0.1 * contradictions.len() as f64).min(0.3);
        score -= penalty;
        for (a, b) in &contradictions {
            findings.push(format!("Contradictory phrasing: '{a}' and '{b}'"));
        }
    }

    let generation = proposal.generation();
    let tokens = generation.tokens.total;
    if tokens > 0 {
        if generation.latency_ms < 100 && tokens > 500 {
            score -= 0.1;
            findings.push(format!(
                "Implausible latency: {tokens} tokens in {}ms",
                generation.latency_ms
            ));
        }
        if tokens < 20 && rationale_len > 500 {
            score -= 0.1;
            findings.push(format!(
                "Implausible token count: {tokens} tokens for {rationale_len} chars"
            ));
        }
    }

    score.max(0.0)
}

/// Opposite word pairs that both occur in `text`.
pub fn find_contradictions(text: &str) -> Vec<(&'static str, &'static str)> {
    let lower = text.to_lowercase();
    let words: HashSet<&str> = WORD_PATTERN.find_iter(&lower).map(|m| m.as_str()).collect();
    CONTRADICTION_PAIRS
        .iter()
        .filter(|(a, b)| words.contains(a) && words.contains(b))
        .copied()
        .collect()
}

// ── Evidence quality ───────────────────────────────────────────────

/// Diversity + specificity + structure + average length, capped at 1.0.
pub fn score_evidence_quality(evidence: &[String], findings: &mut Vec<String>) -> f64 {
    if evidence.is_empty() {
        return 0.1;
    }
    let n = evidence.len() as f64;

    let categories = evidence_categories(evidence);
    let diversity = match categories.len() {
        0 => 0.0,
        1 => 0.1,
        2 => 0.2,
        _ => 0.3,
    };
    if categories.len() <= 1 {
        findings.push("Evidence lacks variety".to_string());
    }

    let specific = evidence.iter().filter(|e| is_specific(e)).count() as f64;
    let specificity = 0.3 * specific / n;

    let structured = evidence
        .iter()
        .filter(|e| e.contains(':') || e.contains('=') || e.contains('{'))
        .count() as f64;
    let structure = 0.2 * structured / n;

    let avg_len = evidence.iter().map(|e| e.chars().count()).sum::<usize>() as f64 / n;
    let length = if avg_len >= 80.0 {
        0.2
    } else if avg_len >= 40.0 {
        0.1
    } else {
        0.05
    };

    (diversity + specificity + structure + length).min(1.0)
}

/// Distinct keyword categories the evidence touches.
pub fn evidence_categories(evidence: &[String]) -> HashSet<&'static str> {
    let mut found = HashSet::new();
    for item in evidence {
        let lower = item.to_lowercase();
        for (category, keywords) in EVIDENCE_CATEGORIES {
            if keywords.iter().any(|k| lower.contains(k)) {
                found.insert(*category);
            }
        }
    }
    found
}

fn is_specific(item: &str) -> bool {
    item.chars().count() >= 30 || NUMERIC_PATTERN.is_match(item) || IDENTIFIER_PATTERN.is_match(item)
}
