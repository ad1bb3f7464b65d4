//! Prompt constants and builders for every generative call the committee makes.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes.
//! The version is recorded on each decision so a regression can be traced to
//! the prompt set that produced it.

use crate::proposal::DisputeInput;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// System prompt for raters producing a proposal.
pub const PROPOSER_PREAMBLE: &str = "\
You are an independent rater on a decision committee. You are given a disputed \
question with exactly two possible answers, referred to as partyA and partyB.

## Your Task
Decide which party the evidence favours. Work only from the question and the \
context you are given. Do not invent facts.

## Output Format
Respond with a single JSON object and nothing else:
{
  \"winner\": \"partyA\" | \"partyB\",
  \"confidence\": <number between 0 and 1>,
  \"rationale\": \"<your reasoning, 2-6 sentences>\",
  \"evidence\": [\"<specific fact from the context>\", ...]
}

## Rules
- Cite concrete facts as evidence: dates, amounts, identifiers, quotes.
- Lower your confidence when the context is thin or contradictory.
- Never answer anything other than partyA or partyB.";

/// System prompt for the pairwise comparison judge.
pub const PAIRWISE_JUDGE_PREAMBLE: &str = "\
You are an impartial judge comparing two proposals that answer the same \
disputed question. Judge the quality of each proposal's argument, not which \
answer you personally prefer.

## Criteria (score each side 0 to 1)
- accuracy: claims are consistent with the cited evidence
- reasoning: the argument is coherent and complete
- evidence_quality: evidence is specific, relevant and verifiable
- clarity: the proposal is easy to follow

## Output Format
Respond with a single JSON object and nothing else:
{
  \"winner\": \"1\" | \"2\" | \"tie\",
  \"confidence\": <number between 0 and 1>,
  \"scores\": {
    \"proposal_1\": {\"accuracy\": 0.0, \"reasoning\": 0.0, \"evidence_quality\": 0.0, \"clarity\": 0.0},
    \"proposal_2\": {\"accuracy\": 0.0, \"reasoning\": 0.0, \"evidence_quality\": 0.0, \"clarity\": 0.0}
  },
  \"reasoning\": [\"<short point>\", ...]
}

## Rules
- Ignore the order in which the proposals are shown.
- Ignore length. A longer proposal is not a better one.
- Declare a tie only when neither proposal is clearly stronger.";

/// System prompt for the narrative writer of a consensus summary.
pub const SYNTHESIS_PREAMBLE: &str = "\
You write the short public summary of a committee decision. The decision, its \
confidence and the supporting arguments are already fixed. Summarise them in \
one or two plain paragraphs. Do not change the outcome, do not add new \
arguments and do not state any number that is not given to you.";

/// User prompt for a rater. Party identifiers are replaced by symbolic names.
pub fn build_proposal_prompt(input: &DisputeInput) -> String {
    let mut prompt = format!(
        "## Question\n\n{}\n\n## Parties\n\n- partyA: {}\n- partyB: {}\n",
        input.question, input.party_a, input.party_b
    );
    if let Some(ref context) = input.context {
        prompt.push_str("\n## Context\n\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt.push_str("\nWhich party does the evidence favour?");
    prompt
}

/// Proposer system prompt, with the rater's persona appended when present.
pub fn proposer_system_prompt(persona: Option<&str>) -> String {
    match persona {
        Some(p) if !p.trim().is_empty() => format!("{PROPOSER_PREAMBLE}\n\n## Perspective\n{p}"),
        _ => PROPOSER_PREAMBLE.to_string(),
    }
}

/// One side of a pairwise comparison as shown to the judge.
#[derive(Debug, Clone)]
pub struct ComparisonSide<'a> {
    /// "Proposal 1" or "Proposal 2"
    pub label: &'a str,
    /// Rater name, omitted when masking.
    pub rater: Option<&'a str>,
    pub winner_choice: &'a str,
    pub confidence: f64,
    pub rationale: &'a str,
    pub evidence: &'a [String],
}

fn render_side(side: &ComparisonSide<'_>) -> String {
    let mut out = format!("## {}\n\n", side.label);
    if let Some(rater) = side.rater {
        out.push_str(&format!("Rater: {rater}\n"));
    }
    out.push_str(&format!(
        "Answer: {}\nConfidence: {:.2}\n\nRationale:\n{}\n",
        side.winner_choice, side.confidence, side.rationale
    ));
    if side.evidence.is_empty() {
        out.push_str("\nEvidence: none cited\n");
    } else {
        out.push_str("\nEvidence:\n");
        for item in side.evidence {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out
}

/// User prompt for one pairwise round.
pub fn build_comparison_prompt(
    question: &str,
    first: &ComparisonSide<'_>,
    second: &ComparisonSide<'_>,
) -> String {
    format!(
        "## Question\n\n{question}\n\n{}\n{}\nWhich proposal makes the stronger case?",
        render_side(first),
        render_side(second)
    )
}

/// User prompt for a generated consensus summary.
pub fn build_synthesis_prompt(
    winner: &str,
    confidence: f64,
    method: &str,
    supporting_points: &[String],
    dissent: &[String],
) -> String {
    let mut prompt = format!(
        "Decision: {winner}\nConfidence: {:.0}%\nMethod: {method}\n\n## Supporting points\n",
        confidence * 100.0
    );
    for point in supporting_points {
        prompt.push_str(&format!("- {point}\n"));
    }
    if !dissent.is_empty() {
        prompt.push_str("\n## Dissent\n");
        for point in dissent {
            prompt.push_str(&format!("- {point}\n"));
        }
    }
    prompt
}
