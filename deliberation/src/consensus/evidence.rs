//! Evidence merging and overlap.

use std::collections::{HashMap, HashSet};

use crate::proposal::AgentProposal;

/// Maximum merged evidence items kept on a result.
pub const MAX_MERGED_EVIDENCE: usize = 10;

/// Merge evidence from proposals that agree with `winner`.
///
/// Each distinct item (exact match after trimming) scores Σ(confidence ×
/// quality) over the proposals citing it. Items are ranked by score, ties kept
/// in first-seen order, and the top ten returned.
pub fn merge_evidence(
    proposals: &[AgentProposal],
    quality: &HashMap<String, f64>,
    winner: &str,
) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: HashMap<String, f64> = HashMap::new();

    for p in proposals.iter().filter(|p| p.winner_choice() == winner) {
        let q = quality.get(p.id()).copied().unwrap_or(0.5);
        let mut seen_here = HashSet::new();
        for item in p.evidence() {
            let key = item.trim();
            if key.is_empty() || !seen_here.insert(key) {
                continue;
            }
            match scores.get_mut(key) {
                Some(score) => *score += p.confidence() * q,
                None => {
                    scores.insert(key.to_string(), p.confidence() * q);
                    order.push(key.to_string());
                }
            }
        }
    }

    let mut ranked: Vec<(usize, String)> = order.into_iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| {
        let sa = scores.get(a).copied().unwrap_or(0.0);
        let sb = scores.get(b).copied().unwrap_or(0.0);
        sb.total_cmp(&sa).then(ia.cmp(ib))
    });
    ranked
        .into_iter()
        .take(MAX_MERGED_EVIDENCE)
        .map(|(_, item)| item)
        .collect()
}

/// Items cited by at least two proposals over all distinct items.
pub fn evidence_overlap(proposals: &[AgentProposal]) -> f64 {
    let mut citations: HashMap<&str, usize> = HashMap::new();
    for p in proposals {
        let distinct: HashSet<&str> = p
            .evidence()
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect();
        for item in distinct {
            *citations.entry(item).or_insert(0) += 1;
        }
    }
    if citations.is_empty() {
        return 0.0;
    }
    let shared = citations.values().filter(|&&c| c >= 2).count();
    shared as f64 / citations.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::RaterProfile;

    fn p(rater: &str, winner: &str, confidence: f64, evidence: &[&str]) -> AgentProposal {
        AgentProposal::builder(&RaterProfile::new(rater, rater, "mock"), "s")
            .winner(winner)
            .confidence(confidence)
            .rationale("r")
            .evidence(evidence.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn test_merge_ranks_shared_items_first() {
        let ps = vec![
            p("1", "A", 0.9, &["invoice", "email"]),
            p("2", "A", 0.8, &["email", "log"]),
            p("3", "B", 1.0, &["rival claim"]),
        ];
        let merged = merge_evidence(&ps, &HashMap::new(), "A");
        assert_eq!(merged[0], "email");
        assert_eq!(merged.len(), 3);
        assert!(!merged.contains(&"rival claim".to_string()));
    }

    #[test]
    fn test_merge_caps_at_ten() {
        let items: Vec<String> = (0..15).map(|i| format!("item {i}")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let ps = vec![p("1", "A", 0.5, &refs)];
        let merged = merge_evidence(&ps, &HashMap::new(), "A");
        assert_eq!(merged.len(), MAX_MERGED_EVIDENCE);
        assert_eq!(merged[0], "item 0");
    }

    #[test]
    fn test_overlap_ratio() {
        let ps = vec![
            p("1", "A", 0.5, &["x", "y"]),
            p("2", "B", 0.5, &["y", "z"]),
        ];
        assert!((evidence_overlap(&ps) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(evidence_overlap(&[p("1", "A", 0.5, &[])]), 0.0);
    }
}
