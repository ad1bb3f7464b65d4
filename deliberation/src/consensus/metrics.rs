//! Agreement metrics and calibration.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::evidence::evidence_overlap;
use super::types::{AlternativeChoice, ConsensusMetrics};
use crate::judge::rules::find_contradictions;
use crate::proposal::AgentProposal;

/// Cap on reported unique insights.
pub const MAX_UNIQUE_INSIGHTS: usize = 5;
/// Lower bound of calibrated confidence.
pub const MIN_CALIBRATED_CONFIDENCE: f64 = 0.1;
/// Upper bound of calibrated confidence.
pub const MAX_CALIBRATED_CONFIDENCE: f64 = 0.9;

const CONTRADICTION_MARKERS: &[&str] = &["however", "but", "although", "contrary"];

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?\n]+").expect("SENTENCE_SPLIT regex should compile"));

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 ]+").expect("NON_WORD regex should compile"));

static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("SPACES regex should compile"));

/// Round to four decimals.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Population variance.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Fraction of proposals backing `winner`.
pub fn unanimity_level(proposals: &[AgentProposal], winner: &str) -> f64 {
    if proposals.is_empty() {
        return 0.0;
    }
    let backing = proposals
        .iter()
        .filter(|p| p.winner_choice() == winner)
        .count();
    backing as f64 / proposals.len() as f64
}

fn normalize_sentence(sentence: &str) -> String {
    let lower = sentence.to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, " ");
    SPACES.replace_all(stripped.trim(), " ").into_owned()
}

/// Sentences of a rationale paired with their normalized form. Fragments
/// under three words are dropped.
fn sentences(text: &str) -> Vec<(String, String)> {
    SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), normalize_sentence(s)))
        .filter(|(_, norm)| norm.split(' ').count() >= 3)
        .collect()
}

fn is_conflicting(sentence: &str) -> bool {
    let norm = normalize_sentence(sentence);
    let words: HashSet<&str> = norm.split(' ').collect();
    CONTRADICTION_MARKERS.iter().any(|m| words.contains(m))
        || !find_contradictions(sentence).is_empty()
}

/// Shared, conflicting and unique reasoning fragments, in first-seen order.
pub fn reasoning_fragments(proposals: &[AgentProposal]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut order: Vec<String> = Vec::new();
    let mut display: HashMap<String, String> = HashMap::new();
    let mut frequency: HashMap<String, usize> = HashMap::new();
    let mut conflicting = Vec::new();

    for p in proposals {
        let mut seen_here = HashSet::new();
        for (original, norm) in sentences(p.rationale()) {
            if !seen_here.insert(norm.clone()) {
                continue;
            }
            if is_conflicting(&original) && !conflicting.contains(&original) {
                conflicting.push(original.clone());
            }
            *frequency.entry(norm.clone()).or_insert(0) += 1;
            if !display.contains_key(&norm) {
                display.insert(norm.clone(), original);
                order.push(norm);
            }
        }
    }

    let mut shared = Vec::new();
    let mut unique = Vec::new();
    for norm in &order {
        let text = display.get(norm).cloned().unwrap_or_default();
        match frequency.get(norm).copied().unwrap_or(0) {
            0 => {}
            1 => {
                if unique.len() < MAX_UNIQUE_INSIGHTS {
                    unique.push(text);
                }
            }
            _ => shared.push(text),
        }
    }
    (shared, conflicting, unique)
}

/// All agreement metrics for a proposal set.
pub fn compute_metrics(proposals: &[AgentProposal], winner: &str) -> ConsensusMetrics {
    let confidences: Vec<f64> = proposals.iter().map(|p| p.confidence()).collect();
    let (shared_points, conflicting_points, unique_insights) = reasoning_fragments(proposals);
    ConsensusMetrics {
        unanimity_level: unanimity_level(proposals, winner),
        confidence_variance: population_variance(&confidences),
        evidence_overlap: evidence_overlap(proposals),
        shared_points,
        conflicting_points,
        unique_insights,
    }
}

/// Calibrate a base confidence against the metrics.
///
/// ```text
/// qa       = 0.1(1−u) + 0.1·var − 0.05·overlap + min(0.1, 0.02·conflicts), in [−0.2, 0.2]
/// adjusted = round4(clamp(base − qa, 0.1, 0.9))
/// residual = round4(1 − adjusted)
/// ```
pub fn calibrate(base: f64, metrics: &ConsensusMetrics) -> (f64, f64) {
    let conflicts = metrics.conflicting_points.len() as f64;
    let adjustment = (0.1 * (1.0 - metrics.unanimity_level)
        + 0.1 * metrics.confidence_variance
        - 0.05 * metrics.evidence_overlap
        + (0.02 * conflicts).min(0.1))
    .clamp(-0.2, 0.2);
    let base = if base.is_finite() { base } else { 0.0 };
    let adjusted = round4((base - adjustment).clamp(MIN_CALIBRATED_CONFIDENCE, MAX_CALIBRATED_CONFIDENCE));
    let residual = round4(1.0 - adjusted);
    (adjusted, residual)
}

/// Every non-winning choice, by support then name.
pub fn alternative_choices(proposals: &[AgentProposal], winner: &str) -> Vec<AlternativeChoice> {
    let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
    for p in proposals.iter().filter(|p| p.winner_choice() != winner) {
        grouped
            .entry(p.winner_choice())
            .or_default()
            .push(p.confidence());
    }
    let total = proposals.len().max(1) as f64;
    let mut alternatives: Vec<AlternativeChoice> = grouped
        .into_iter()
        .map(|(choice, confidences)| AlternativeChoice {
            choice: choice.to_string(),
            support: confidences.len() as f64 / total,
            mean_confidence: confidences.iter().sum::<f64>() / confidences.len() as f64,
        })
        .collect();
    alternatives.sort_by(|a, b| {
        b.support
            .total_cmp(&a.support)
            .then_with(|| a.choice.cmp(&b.choice))
    });
    alternatives
}
