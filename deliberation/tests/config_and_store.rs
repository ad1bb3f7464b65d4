//! Configuration files and the JSON decision store.

use std::collections::HashMap;
use std::io::Write;

use deliberation::committee::{CommitteeDecision, DecisionDraft, DecisionMetrics};
use deliberation::consensus::{ConsensusMethod, ConsensusSynthesizer};
use deliberation::judge::JudgeMode;
use deliberation::persistence::{DecisionStore, JsonFileStore, StoreError};
use deliberation::proposal::{AgentProposal, RaterProfile};
use deliberation::{CommitteeConfig, ConfigError};

fn decision(subject: &str, winner: &str) -> CommitteeDecision {
    let rater = RaterProfile::new("r1", "R1", "scripted");
    let proposals = vec![AgentProposal::builder(&rater, subject)
        .winner(winner)
        .confidence(0.7)
        .rationale("the invoice trail supports this side")
        .evidence(["invoice 118"])
        .build()
        .unwrap()];
    let consensus = ConsensusSynthesizer::new()
        .decide(&proposals, &[], ConsensusMethod::Majority, &HashMap::new())
        .unwrap();
    CommitteeDecision::assemble(DecisionDraft {
        subject_id: subject.to_string(),
        final_winner: winner.to_string(),
        proposals,
        evaluations: vec![],
        comparisons: vec![],
        consensus,
        jury: None,
        metrics: DecisionMetrics::default(),
    })
    .unwrap()
}

// ── Config ─────────────────────────────────────────────────────────

#[test]
fn test_load_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
consensus_method = "approval"
judge_mode = "hybrid"
pairwise_rounds = 5
min_proposals = 3

[bias]
normalize_length = false

[[raters]]
id = "gpt"
name = "GPT"
provider = "openai"
model = "gpt-4o-mini"

[[raters]]
id = "claude"
name = "Claude"
provider = "anthropic"
weight = 0.6
"#
    )
    .unwrap();

    let config = CommitteeConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.consensus_method, ConsensusMethod::Approval);
    assert_eq!(config.judge_mode, JudgeMode::Hybrid);
    assert_eq!(config.effective_pairwise_rounds(), 5);
    assert_eq!(config.min_proposals, 3);
    assert!(!config.bias.normalize_length);
    assert_eq!(config.raters.len(), 2);
    assert_eq!(config.raters[1].weight, 0.6);
    assert_eq!(config.deliberation_timeout_ms, 300_000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let err = CommitteeConfig::from_toml_str("consensus_method = [").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_unknown_method_is_rejected() {
    assert!(CommitteeConfig::from_toml_str(r#"consensus_method = "dictator""#).is_err());
}

// ── JSON store ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_json_store_keeps_latest_per_subject() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    let first = decision("d-1", "acme");
    store.save(&first).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = decision("d-1", "globex");
    store.save(&second).await.unwrap();
    store.save(&decision("d-2", "acme")).await.unwrap();

    let latest = store.load_latest("d-1").await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.final_winner, "globex");

    let files: Vec<_> = std::fs::read_dir(dir.path().join("d-1"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 2);
    assert!(files
        .iter()
        .all(|p| p.extension().and_then(|e| e.to_str()) == Some("json")));
}

#[tokio::test]
async fn test_json_store_rejects_path_like_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    let err = store.save(&decision("../escape", "acme")).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidSubject(_)));
}
