//! Rater response parsing.
//!
//! Strict structured parse first, heuristics over the raw text second.
//! Symbolic party tokens in either path are mapped back to the caller's real
//! identifiers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::ProposalError;

/// Confidence assumed when the text does not state one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const MAX_RATIONALE_CHARS: usize = 2000;
const MAX_EVIDENCE_ITEMS: usize = 10;

static CONFIDENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confiden(?:ce|t)[^0-9\n]{0,20}(\d{1,3}(?:\.\d+)?)\s*(%?)")
        .expect("CONFIDENCE_PATTERN regex should compile")
});

static PERCENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%\s*(?:sure|certain|confiden)")
        .expect("PERCENT_PATTERN regex should compile")
});

static WINNER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:winner|verdict|decision)\W*[:=]\s*\W*([A-Za-z0-9_\-\. ]+)")
        .expect("WINNER_PATTERN regex should compile")
});

static BULLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("BULLET_PATTERN regex should compile")
});

/// An opinion extracted from a rater response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedOpinion {
    pub winner_choice: String,
    pub confidence: f64,
    pub rationale: String,
    pub evidence: Vec<String>,
    /// True when the structured (JSON) path succeeded.
    pub structured: bool,
}

#[derive(Debug, Deserialize)]
struct StructuredOpinion {
    #[serde(alias = "winnerChoice", alias = "winner_choice", alias = "choice")]
    winner: String,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default, alias = "reasoning", alias = "explanation")]
    rationale: Option<String>,
    #[serde(default)]
    evidence: Option<serde_json::Value>,
}

/// Map a symbolic or literal choice to a real party identifier.
///
/// Returns `None` when the token names neither party.
pub fn map_choice(token: &str, party_a: &str, party_b: &str) -> Option<String> {
    let normalized: String = token
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect();

    match normalized.as_str() {
        "a" | "partya" | "proposala" | "optiona" => return Some(party_a.to_string()),
        "b" | "partyb" | "proposalb" | "optionb" => return Some(party_b.to_string()),
        _ => {}
    }

    let trimmed = token.trim();
    if trimmed.eq_ignore_ascii_case(party_a) {
        Some(party_a.to_string())
    } else if trimmed.eq_ignore_ascii_case(party_b) {
        Some(party_b.to_string())
    } else {
        None
    }
}

/// Parse a rater response into an opinion.
///
/// Fails only when neither path can produce a non-empty rationale.
pub fn parse_proposal_response(
    content: &str,
    party_a: &str,
    party_b: &str,
) -> Result<ParsedOpinion, ProposalError> {
    if let Some(opinion) = parse_structured(content, party_a, party_b) {
        return Ok(opinion);
    }
    parse_heuristic(content, party_a, party_b)
}

/// Locate the first JSON object in `text`, tolerating code fences and prose.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &text[start..=end];
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Prose around several objects: try each balanced top-level object.
    let bytes = candidate.as_bytes();
    let mut depth = 0usize;
    let mut open = None;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = open {
                        if let Ok(value) =
                            serde_json::from_str::<serde_json::Value>(&candidate[s..=i])
                        {
                            if value.is_object() {
                                return Some(value);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_structured(content: &str, party_a: &str, party_b: &str) -> Option<ParsedOpinion> {
    let value = extract_json_object(content)?;
    let raw: StructuredOpinion = serde_json::from_value(value).ok()?;

    let winner_choice = map_choice(&raw.winner, party_a, party_b)?;
    let confidence = raw
        .confidence
        .as_ref()
        .and_then(confidence_from_json)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let rationale = raw
        .rationale
        .map(|r| truncate_chars(r.trim(), MAX_RATIONALE_CHARS))
        .filter(|r| !r.is_empty())?;
    let evidence = raw.evidence.map(evidence_from_json).unwrap_or_default();

    Some(ParsedOpinion {
        winner_choice,
        confidence,
        rationale,
        evidence,
        structured: true,
    })
}

fn confidence_from_json(value: &serde_json::Value) -> Option<f64> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    normalize_confidence(raw)
}

fn evidence_from_json(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .take(MAX_EVIDENCE_ITEMS)
            .collect(),
        serde_json::Value::String(s) => vec![s],
        _ => Vec::new(),
    }
}

/// Percentages (1 < x ≤ 100) become fractions; anything else out of range is rejected.
fn normalize_confidence(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw < 0.0 {
        None
    } else if raw <= 1.0 {
        Some(raw)
    } else if raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        None
    }
}

/// Extract a stated confidence from free text.
pub fn extract_confidence(text: &str) -> Option<f64> {
    if let Some(caps) = CONFIDENCE_PATTERN.captures(text) {
        let number: f64 = caps.get(1)?.as_str().parse().ok()?;
        let is_percent = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
        return if is_percent {
            normalize_confidence(number / 100.0)
        } else {
            normalize_confidence(number)
        };
    }
    let caps = PERCENT_PATTERN.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    normalize_confidence(number / 100.0)
}

static SYMBOLIC_A_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bparty\s*a\b").expect("SYMBOLIC_A_PATTERN regex should compile")
});

static SYMBOLIC_B_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bparty\s*b\b").expect("SYMBOLIC_B_PATTERN regex should compile")
});

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive whole-word pattern for a party identifier.
///
/// Word boundaries are only anchored on ends that are word characters, so
/// identifiers like `co.` or `(acme)` still match.
fn party_pattern(party: &str) -> Option<Regex> {
    let party = party.trim();
    let first = party.chars().next()?;
    let last = party.chars().last()?;
    let pattern = format!(
        "(?i){}{}{}",
        if is_word_char(first) { r"\b" } else { "" },
        regex::escape(party),
        if is_word_char(last) { r"\b" } else { "" },
    );
    Regex::new(&pattern).ok()
}

/// Count how often each party is referenced as a whole word, including
/// symbolic tokens.
pub fn count_party_mentions(text: &str, party_a: &str, party_b: &str) -> (usize, usize) {
    let mentions = |party: &str, symbolic: &Regex| -> usize {
        let symbolic_count = symbolic.find_iter(text).count();
        // A symbolic identifier such as "partyA" is already covered.
        let party = party.trim();
        if symbolic.find(party).is_some_and(|m| m.as_str().len() == party.len()) {
            return symbolic_count;
        }
        party_pattern(party).map_or(0, |re| re.find_iter(text).count()) + symbolic_count
    };
    (
        mentions(party_a, &SYMBOLIC_A_PATTERN),
        mentions(party_b, &SYMBOLIC_B_PATTERN),
    )
}

fn parse_heuristic(
    content: &str,
    party_a: &str,
    party_b: &str,
) -> Result<ParsedOpinion, ProposalError> {
    let text = content.trim();
    if text.is_empty() {
        return Err(ProposalError::Unparseable("empty response".to_string()));
    }

    let explicit = WINNER_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| map_choice(m.as_str(), party_a, party_b));

    let winner_choice = explicit.unwrap_or_else(|| {
        let (a, b) = count_party_mentions(text, party_a, party_b);
        // Ambiguous defaults to the first party.
        if b > a {
            party_b.to_string()
        } else {
            party_a.to_string()
        }
    });

    let evidence: Vec<String> = BULLET_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .take(MAX_EVIDENCE_ITEMS)
        .collect();

    Ok(ParsedOpinion {
        winner_choice,
        confidence: extract_confidence(text).unwrap_or(DEFAULT_CONFIDENCE),
        rationale: truncate_chars(text, MAX_RATIONALE_CHARS),
        evidence,
        structured: false,
    })
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "acme-corp";
    const B: &str = "globex";

    #[test]
    fn test_structured_parse_maps_symbolic_tokens() {
        let content = r#"Here is my answer:
```json
{"winner": "partyB", "confidence": 0.82, "rationale": "Globex delivered first.", "evidence": ["delivery log 2024-03-01", "signed receipt"]}
```"#;
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert!(opinion.structured);
        assert_eq!(opinion.winner_choice, B);
        assert_eq!(opinion.confidence, 0.82);
        assert_eq!(opinion.evidence.len(), 2);
    }

    #[test]
    fn test_structured_parse_accepts_aliases_and_percent() {
        let content = r#"{"winnerChoice": "A", "confidence": "75%", "reasoning": "Acme met the deadline."}"#;
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert_eq!(opinion.winner_choice, A);
        assert_eq!(opinion.confidence, 0.75);
        assert!(opinion.evidence.is_empty());
    }

    #[test]
    fn test_structured_parse_accepts_real_identifier() {
        let content = r#"{"winner": "Globex", "confidence": 0.6, "rationale": "r"}"#;
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert_eq!(opinion.winner_choice, B);
    }

    #[test]
    fn test_unknown_winner_falls_back_to_heuristics() {
        let content = r#"{"winner": "nobody", "confidence": 0.9, "rationale": "globex globex"}"#;
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert!(!opinion.structured);
        assert_eq!(opinion.winner_choice, B);
    }

    #[test]
    fn test_heuristic_counts_mentions() {
        let content = "Looking at the record, Globex shipped on time. Acme did not. \
                       Globex also has the signed invoice. Confidence: 70%\n\
                       - Globex invoice dated March 1\n- Acme missed the deadline";
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert!(!opinion.structured);
        assert_eq!(opinion.winner_choice, B);
        assert!((opinion.confidence - 0.7).abs() < 1e-9);
        assert_eq!(opinion.evidence.len(), 2);
    }

    #[test]
    fn test_party_mentions_match_whole_words() {
        // "party also" and "party about" are not "party a"; "acmeville" is not "acme"
        let text = "The party also argued, and the party about to sign was Acmeville Ltd. \
                    Party B delivered; globex kept the receipts.";
        assert_eq!(count_party_mentions(text, "acme", "globex"), (0, 2));

        let (a, b) = count_party_mentions("Acme paid. ACME's invoice. PartyA agrees.", "acme", "globex");
        assert_eq!((a, b), (3, 0));

        // symbolic identifiers are not counted twice
        assert_eq!(count_party_mentions("partyA and party a", "partyA", "partyB"), (2, 0));

        // identifiers ending in punctuation still match
        assert_eq!(count_party_mentions("Blue Co. shipped late", "blue co.", "red"), (1, 0));
    }

    #[test]
    fn test_heuristic_explicit_winner_line() {
        let content = "Winner: party A\nThe contract terms favour them.";
        let opinion = parse_proposal_response(content, A, B).unwrap();
        assert_eq!(opinion.winner_choice, A);
        assert_eq!(opinion.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_heuristic_ambiguous_defaults_to_first_party() {
        let opinion = parse_proposal_response("It is hard to say.", A, B).unwrap();
        assert_eq!(opinion.winner_choice, A);
    }

    #[test]
    fn test_empty_response_is_unparseable() {
        assert!(matches!(
            parse_proposal_response("   ", A, B),
            Err(ProposalError::Unparseable(_))
        ));
    }

    #[test]
    fn test_extract_confidence_forms() {
        assert_eq!(extract_confidence("confidence = 0.9"), Some(0.9));
        assert_eq!(extract_confidence("I am confident at 85%"), Some(0.85));
        assert_eq!(extract_confidence("roughly 60% sure"), Some(0.6));
        assert_eq!(extract_confidence("no number here"), None);
    }

    #[test]
    fn test_map_choice_variants() {
        assert_eq!(map_choice("party_a", A, B).as_deref(), Some(A));
        assert_eq!(map_choice(" B ", A, B).as_deref(), Some(B));
        assert_eq!(map_choice("ACME-CORP", A, B).as_deref(), Some(A));
        assert_eq!(map_choice("initech", A, B), None);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
