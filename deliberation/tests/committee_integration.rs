//! End-to-end committee runs against scripted generators (no network).
//!
//! Verifies:
//! - unanimous committees decide without a jury
//! - contested committees escalate, and a confident jury verdict wins
//! - input validation, insufficient proposals, and per-subject exclusion
//! - the overall deliberation timeout releases the subject into cooldown
//! - pairwise and hybrid judging, weighted voting overrides
//! - decisions reach the configured store and progress events are emitted

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use deliberation::committee::{CommitteeError, Stage};
use deliberation::consensus::{ConsensusMethod, ConsensusResult, GeneratedReasoning};
use deliberation::coordinator::DecisionCoordinator;
use deliberation::events::{DeliberationPhase, EventSink, MessageType, NullSink, RecordingSink};
use deliberation::generation::{GeneratorRegistry, ScriptedGenerator};
use deliberation::judge::{BiasMitigation, JudgeMode};
use deliberation::jury::{
    JurorOpinion, JurorPosition, JuryDeliberation, JuryError, JuryProcess,
};
use deliberation::persistence::{DecisionStore, JsonFileStore, MemoryStore};
use deliberation::proposal::{AgentProposal, DisputeInput, RaterProfile};
use deliberation::{CommitteeConfig, CommitteeOrchestrator};

const PARTY_A: &str = "acme";
const PARTY_B: &str = "globex";

/// Structured proposer response voting for `choice`.
fn opinion(choice: &str, confidence: f64) -> String {
    format!(
        r#"{{"winner": "{choice}", "confidence": {confidence}, "rationale": "The delivery records and the signed contract both favor {choice}; the counterparty's claims are not supported by the timeline.", "evidence": ["signed contract clause 4.2", "delivery log dated 2024-03-01", "email thread from the account manager"]}}"#
    )
}

fn rater(id: &str) -> RaterProfile {
    RaterProfile::new(id, id.to_uppercase(), id)
}

fn input(subject: &str) -> DisputeInput {
    DisputeInput::new(subject, "Who breached the supply contract?", PARTY_A, PARTY_B)
}

/// Config with one rater per scripted provider.
fn config_for(ids: &[&str]) -> CommitteeConfig {
    CommitteeConfig {
        raters: ids.iter().map(|id| rater(id)).collect(),
        ..Default::default()
    }
}

fn registry(generators: Vec<(&str, Arc<ScriptedGenerator>)>) -> GeneratorRegistry {
    generators
        .into_iter()
        .fold(GeneratorRegistry::new(), |reg, (id, g)| reg.with(id, g))
}

fn constant<'a>(id: &'a str, choice: &str, confidence: f64) -> (&'a str, Arc<ScriptedGenerator>) {
    (
        id,
        Arc::new(ScriptedGenerator::constant(id, opinion(choice, confidence))),
    )
}

/// Jury that always returns a unanimous panel for `position`.
struct FixedJury {
    position: JurorPosition,
    confidence: f64,
}

#[async_trait]
impl JuryProcess for FixedJury {
    async fn deliberate(
        &self,
        input: &DisputeInput,
        _proposals: &[AgentProposal],
        _consensus: &ConsensusResult,
        _sink: &dyn EventSink,
    ) -> Result<JuryDeliberation, JuryError> {
        let jurors = (1..=3)
            .map(|i| JurorOpinion {
                juror_id: format!("juror-{i}"),
                name: format!("Juror {i}"),
                current_position: self.position,
                confidence_level: self.confidence,
                reasoning: "records are clear".to_string(),
                key_arguments: vec![],
                concerns: vec![],
            })
            .collect();
        let mut jury = JuryDeliberation::new(&input.subject_id, jurors, 5);
        jury.unanimous_decision = true;
        jury.final_verdict = self.position;
        Ok(jury)
    }
}

struct BrokenJury;

#[async_trait]
impl JuryProcess for BrokenJury {
    async fn deliberate(
        &self,
        _input: &DisputeInput,
        _proposals: &[AgentProposal],
        _consensus: &ConsensusResult,
        _sink: &dyn EventSink,
    ) -> Result<JuryDeliberation, JuryError> {
        Err(JuryError::NoJurors)
    }
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unanimous_committee_decides_without_jury() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2", "r3"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
            constant("r3", "A", 0.9),
        ]))
        .build()
        .unwrap();

    let sink = RecordingSink::new();
    let decision = orchestrator
        .deliberate_and_decide(&input("d-1"), &sink)
        .await
        .unwrap();

    assert_eq!(decision.final_winner, PARTY_A);
    assert_eq!(decision.proposals.len(), 3);
    assert_eq!(decision.evaluations.len(), 3);
    assert!(decision.jury.is_none());
    assert!(!decision.metrics.escalated);
    assert_eq!(decision.metrics.proposals_requested, 3);
    assert_eq!(decision.metrics.proposals_received, 3);
    assert!(decision.metrics.total_tokens > 0);
    assert!(decision.metrics.stage(Stage::Proposing).is_some());
    assert!(decision.metrics.stage(Stage::Jury).is_none());

    let c = &decision.consensus;
    assert!(c.confidence_level >= 0.1 && c.confidence_level <= 0.9);
    assert!((c.confidence_level + c.residual_uncertainty - 1.0).abs() < 1e-4);
    assert!(!c.synthesized_reasoning.is_empty());
}

#[tokio::test]
async fn test_progress_events_cover_every_stage() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2", "r3"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.8),
            constant("r3", "partyA", 0.7),
        ]))
        .build()
        .unwrap();

    let sink = RecordingSink::new();
    orchestrator
        .deliberate_and_decide(&input("d-events"), &sink)
        .await
        .unwrap();

    assert_eq!(sink.count_of(MessageType::Proposal), 3);
    assert_eq!(sink.count_of(MessageType::Evaluation), 3);
    assert_eq!(sink.count_of(MessageType::Synthesis), 1);
    let events = sink.events();
    assert_eq!(events.first().unwrap().phase, DeliberationPhase::Started);
    assert_eq!(events.last().unwrap().phase, DeliberationPhase::Completed);
    assert!(events.iter().all(|e| e.subject_id == "d-events"));
}

// ── Jury escalation ────────────────────────────────────────────────

#[tokio::test]
async fn test_contested_committee_escalates_to_jury() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2", "r3", "r4"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.8),
            constant("r3", "partyB", 0.6),
            constant("r4", "partyB", 0.6),
        ]))
        .build()
        .unwrap();

    let sink = RecordingSink::new();
    let decision = orchestrator
        .deliberate_and_decide(&input("d-split"), &sink)
        .await
        .unwrap();

    assert!(decision.consensus.confidence_level < 0.6);
    assert!(decision.escalated());
    assert!(decision.metrics.escalated);
    assert!(decision.metrics.stage(Stage::Jury).is_some());
    assert!([PARTY_A, PARTY_B].contains(&decision.final_winner.as_str()));
    assert!(sink.count_of(MessageType::Vote) >= 1);
}

#[tokio::test]
async fn test_confident_jury_verdict_overrides_consensus() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2", "r3", "r4"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.8),
            constant("r3", "partyB", 0.6),
            constant("r4", "partyB", 0.6),
        ]))
        .jury(Arc::new(FixedJury {
            position: JurorPosition::B,
            confidence: 0.95,
        }))
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-override"), &NullSink)
        .await
        .unwrap();

    assert_eq!(decision.consensus.winner_choice, PARTY_A);
    assert_eq!(decision.final_winner, PARTY_B);
    let report = decision.jury.as_ref().unwrap();
    assert!(report.verdict_applied);
    assert!(report.outcome.unanimous);
    assert!(decision.final_confidence > decision.consensus.confidence_level);
}

#[tokio::test]
async fn test_jury_verdict_without_backing_proposal_is_ignored() {
    // Every rater picks A, so a B verdict has no proposal behind it.
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
        ]))
        .jury(Arc::new(FixedJury {
            position: JurorPosition::B,
            confidence: 0.99,
        }))
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-forced").with_jury(), &NullSink)
        .await
        .unwrap();

    assert!(decision.escalated());
    assert_eq!(decision.final_winner, PARTY_A);
    assert!(!decision.jury.unwrap().verdict_applied);
}

#[tokio::test]
async fn test_failed_jury_keeps_consensus() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyB", 0.5),
        ]))
        .jury(Arc::new(BrokenJury))
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-broken-jury"), &NullSink)
        .await
        .unwrap();

    let report = decision.jury.as_ref().unwrap();
    assert!(report.outcome.is_failed());
    assert_eq!(report.outcome.confidence, 0.0);
    assert!(report.deliberation.is_none());
    assert_eq!(decision.final_winner, decision.consensus.winner_choice);
}

#[tokio::test]
async fn test_early_exit_skips_jury() {
    let mut config = config_for(&["r1", "r2", "r3", "r4"]);
    config.enable_early_exit = true;
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config)
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.8),
            constant("r3", "partyB", 0.6),
            constant("r4", "partyB", 0.6),
        ]))
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-early"), &NullSink)
        .await
        .unwrap();
    assert!(decision.consensus.confidence_level < 0.6);
    assert!(decision.jury.is_none());
}

// ── Failure paths ──────────────────────────────────────────────────

#[tokio::test]
async fn test_validation_happens_before_any_call() {
    let g = Arc::new(ScriptedGenerator::constant("r1", opinion("partyA", 0.9)));
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1"]))
        .registry(registry(vec![("r1", g.clone())]))
        .build()
        .unwrap();

    let bad = DisputeInput::new("d-bad", "Who?", PARTY_A, PARTY_A);
    let err = orchestrator
        .deliberate_and_decide(&bad, &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, CommitteeError::Validation(_)));
    assert_eq!(g.calls(), 0);
    assert!(!orchestrator.coordinator().is_busy("d-bad"));
}

#[tokio::test]
async fn test_insufficient_proposals_sets_failure_cooldown() {
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            ("r2", Arc::new(ScriptedGenerator::failing("r2"))),
        ]))
        .build()
        .unwrap();

    let sink = RecordingSink::new();
    let err = orchestrator
        .deliberate_and_decide(&input("d-short"), &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommitteeError::InsufficientProposals { got: 1, need: 2 }
    ));
    let remaining = orchestrator
        .coordinator()
        .cooldown_remaining("d-short")
        .unwrap();
    assert!(remaining > Duration::from_secs(15));
    assert_eq!(
        sink.events().last().unwrap().phase,
        DeliberationPhase::Failed
    );
}

#[tokio::test]
async fn test_subject_exclusion_and_cooldown() {
    let coordinator = Arc::new(DecisionCoordinator::new());
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
        ]))
        .coordinator(coordinator.clone())
        .build()
        .unwrap();

    assert!(coordinator.try_start("d-busy"));
    let err = orchestrator
        .deliberate_and_decide(&input("d-busy"), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, CommitteeError::AlreadyRunning { ref subject_id } if subject_id == "d-busy"));

    orchestrator
        .deliberate_and_decide(&input("d-free"), &NullSink)
        .await
        .unwrap();
    let again = orchestrator
        .deliberate_and_decide(&input("d-free"), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(again, CommitteeError::AlreadyRunning { .. }));
    assert!(again.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_deliberation_timeout_releases_into_cooldown() {
    let mut config = config_for(&["r1", "r2"]);
    config.deliberation_timeout_ms = 1_000;
    let slow = |id: &str| {
        Arc::new(
            ScriptedGenerator::constant(id, opinion("partyA", 0.9))
                .with_delay(Duration::from_secs(10)),
        )
    };
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config)
        .registry(registry(vec![("r1", slow("r1")), ("r2", slow("r2"))]))
        .build()
        .unwrap();

    let err = orchestrator
        .deliberate_and_decide(&input("d-slow"), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, CommitteeError::Timeout(d) if d == Duration::from_secs(1)));
    assert!(orchestrator.coordinator().is_busy("d-slow"));
    assert!(orchestrator.coordinator().cooldown_remaining("d-slow").is_some());
}

// ── Judge modes and methods ────────────────────────────────────────

fn pairwise_verdict(winner: &str) -> String {
    format!(
        r#"{{"winner":"{winner}","confidence":0.8,"scores":{{"proposal_1":{{"accuracy":0.9,"reasoning":0.8,"evidence_quality":0.8,"clarity":0.7}},"proposal_2":{{"accuracy":0.5,"reasoning":0.5,"evidence_quality":0.5,"clarity":0.5}}}},"reasoning":["first is better grounded"]}}"#
    )
}

#[tokio::test]
async fn test_pairwise_mode_records_comparisons() {
    let mut config = config_for(&["r1", "r2", "r3"]);
    config.judge_mode = JudgeMode::Pairwise;
    config.bias = BiasMitigation {
        randomize_order: false,
        ..Default::default()
    };
    let judge = Arc::new(ScriptedGenerator::constant("judge", pairwise_verdict("1")));
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config)
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyB", 0.7),
            constant("r3", "partyA", 0.8),
        ]))
        .judge_generator(judge.clone())
        .build()
        .unwrap();

    let sink = RecordingSink::new();
    let decision = orchestrator
        .deliberate_and_decide(&input("d-pairwise"), &sink)
        .await
        .unwrap();

    assert_eq!(decision.comparisons.len(), 3);
    assert!(decision.comparisons.iter().all(|c| c.rounds.len() == 3));
    assert_eq!(judge.calls(), 9);
    assert!(decision
        .evaluations
        .iter()
        .all(|e| e.mode == JudgeMode::Pairwise));
    assert_eq!(sink.count_of(MessageType::Comparison), 3);

    // Judge calls are billed to the judging stage.
    let judging = decision.metrics.stage(Stage::Judging).unwrap();
    let compared: u64 = decision
        .comparisons
        .iter()
        .map(|c| c.tokens.total as u64)
        .sum();
    assert!(judging.tokens > 0);
    assert_eq!(judging.tokens, compared);
    let proposing = decision.metrics.stage(Stage::Proposing).unwrap();
    assert!(decision.metrics.total_tokens >= proposing.tokens + judging.tokens);
}

#[tokio::test]
async fn test_generated_narrative_is_billed_to_synthesis() {
    let writer = Arc::new(ScriptedGenerator::constant(
        "narrator",
        "Both raters found the delivery log decisive.",
    ));
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
        ]))
        .reasoning_writer(Arc::new(GeneratedReasoning::new(
            writer.clone(),
            Duration::from_secs(5),
        )))
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-narrated"), &NullSink)
        .await
        .unwrap();

    assert_eq!(writer.calls(), 1);
    assert_eq!(
        decision.consensus.synthesized_reasoning,
        "Both raters found the delivery log decisive."
    );
    let synthesis = decision.metrics.stage(Stage::Synthesizing).unwrap();
    assert!(synthesis.tokens > 0);
    assert_eq!(
        synthesis.tokens,
        decision.consensus.reasoning_tokens.total as u64
    );
}

#[tokio::test]
async fn test_hybrid_mode_blends_scores() {
    let mut config = config_for(&["r1", "r2"]);
    config.judge_mode = JudgeMode::Hybrid;
    config.bias.multiple_rounds = false;
    let judge = Arc::new(ScriptedGenerator::constant("judge", pairwise_verdict("tie")));
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config)
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
        ]))
        .judge_generator(judge.clone())
        .judge_seed(7)
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-hybrid"), &NullSink)
        .await
        .unwrap();

    assert_eq!(judge.calls(), 1);
    assert!(decision
        .evaluations
        .iter()
        .all(|e| e.mode == JudgeMode::Hybrid));
}

#[test]
fn test_pairwise_mode_without_generator_is_rejected() {
    let mut config = config_for(&["r1"]);
    config.judge_mode = JudgeMode::Pairwise;
    let result = CommitteeOrchestrator::builder().config(config).build();
    assert!(matches!(result, Err(CommitteeError::Validation(_))));
}

#[tokio::test]
async fn test_weighted_voting_uses_agent_weights() {
    let mut config = config_for(&["r1", "r2", "r3"]);
    config.agent_weights = [("r2".to_string(), 0.1), ("r3".to_string(), 0.1)].into();
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config)
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyB", 0.9),
            constant("r3", "partyB", 0.9),
        ]))
        .build()
        .unwrap();

    let weighted = orchestrator
        .deliberate_and_decide(
            &input("d-weighted").with_method(ConsensusMethod::WeightedVoting),
            &NullSink,
        )
        .await
        .unwrap();
    assert_eq!(weighted.consensus.winner_choice, PARTY_A);
    assert_eq!(weighted.method, ConsensusMethod::WeightedVoting);

    let majority = orchestrator
        .deliberate_and_decide(&input("d-majority"), &NullSink)
        .await
        .unwrap();
    assert_eq!(majority.consensus.winner_choice, PARTY_B);
}

// ── Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn test_decision_is_stored() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyA", 0.9),
            constant("r2", "partyA", 0.9),
        ]))
        .store(store.clone())
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-store"), &NullSink)
        .await
        .unwrap();
    let saved = store.load_latest("d-store").await.unwrap().unwrap();
    assert_eq!(saved.id, decision.id);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_json_store_roundtrip_through_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let orchestrator = CommitteeOrchestrator::builder()
        .config(config_for(&["r1", "r2"]))
        .registry(registry(vec![
            constant("r1", "partyB", 0.9),
            constant("r2", "partyB", 0.7),
        ]))
        .store(store.clone())
        .build()
        .unwrap();

    let decision = orchestrator
        .deliberate_and_decide(&input("d-json"), &NullSink)
        .await
        .unwrap();

    let path = dir
        .path()
        .join("d-json")
        .join(format!("{}.json", decision.id));
    assert!(path.exists());
    let loaded = store.load_latest("d-json").await.unwrap().unwrap();
    assert_eq!(loaded.final_winner, PARTY_B);
    assert!(loaded.consensus.decision_eq(&decision.consensus));
}
