//! Committee orchestrator: runs one dispute through the full pipeline.
//!
//! ```text
//! try_start → proposals (JoinSet, one task per rater)
//!           → judge (rules / pairwise / hybrid)
//!           → synthesize
//!           → jury (contested or forced)
//!           → assemble → store → finish
//! ```
//!
//! The whole run is bounded by the configured deliberation timeout. Any
//! failure after `try_start` puts the subject into the failure cooldown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use super::error::{CommitteeError, CommitteeResult};
use super::types::{
    CommitteeDecision, DecisionDraft, DecisionMetrics, JuryReport, Stage, StageUsage,
};
use crate::config::CommitteeConfig;
use crate::consensus::{ConsensusResult, ConsensusSynthesizer, ReasoningWriter};
use crate::coordinator::DecisionCoordinator;
use crate::events::{DeliberationPhase, EventSink, MessageType, ProgressEvent};
use crate::generation::{GeneratorRegistry, TextGenerator, TokenUsage};
use crate::judge::{
    rank_by_pairwise, Evaluation, JudgeMode, PairwiseComparison, PairwiseJudge, RuleBasedJudge,
};
use crate::jury::{ConvergencePanel, JuryOutcome, JuryProcess, UnanimousConsensus};
use crate::otel;
use crate::persistence::DecisionStore;
use crate::prompts::PROMPT_VERSION;
use crate::proposal::{AgentProposal, DisputeInput, ProposerPool};

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Wiring for [`CommitteeOrchestrator`].
pub struct CommitteeOrchestratorBuilder {
    config: CommitteeConfig,
    registry: GeneratorRegistry,
    coordinator: Option<Arc<DecisionCoordinator>>,
    judge_generator: Option<Arc<dyn TextGenerator>>,
    judge_seed: Option<u64>,
    jury: Option<Arc<dyn JuryProcess>>,
    writer: Option<Arc<dyn ReasoningWriter>>,
    store: Option<Arc<dyn DecisionStore>>,
}

impl CommitteeOrchestratorBuilder {
    fn new() -> Self {
        Self {
            config: CommitteeConfig::default(),
            registry: GeneratorRegistry::new(),
            coordinator: None,
            judge_generator: None,
            judge_seed: None,
            jury: None,
            writer: None,
            store: None,
        }
    }

    pub fn config(mut self, config: CommitteeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Share a coordinator between orchestrators.
    pub fn coordinator(mut self, coordinator: Arc<DecisionCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Generator for the pairwise judge. Defaults to the first rater's provider.
    pub fn judge_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.judge_generator = Some(generator);
        self
    }

    /// Fix the presentation-order seed of the pairwise judge.
    pub fn judge_seed(mut self, seed: u64) -> Self {
        self.judge_seed = Some(seed);
        self
    }

    pub fn jury(mut self, jury: Arc<dyn JuryProcess>) -> Self {
        self.jury = Some(jury);
        self
    }

    pub fn reasoning_writer(mut self, writer: Arc<dyn ReasoningWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn store(mut self, store: Arc<dyn DecisionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> CommitteeResult<CommitteeOrchestrator> {
        let config = self.config;
        config.validate()?;

        // agent_weights override the profile weights
        let weights = config.rater_weights();
        let raters = config
            .raters
            .iter()
            .cloned()
            .map(|mut r| {
                if let Some(w) = weights.get(&r.id) {
                    r.set_weight(*w);
                }
                r
            })
            .collect();

        let pairwise = if config.judge_mode.uses_pairwise() {
            let generator = match self.judge_generator {
                Some(g) => g,
                None => {
                    let provider = config
                        .raters
                        .first()
                        .map(|r| r.provider.as_str())
                        .unwrap_or_default();
                    self.registry.get(provider).map_err(|e| {
                        CommitteeError::Validation(format!("pairwise judge has no generator: {e}"))
                    })?
                }
            };
            let mut judge = PairwiseJudge::new(generator, config.bias)
                .with_request_timeout(config.request_timeout());
            if let Some(seed) = self.judge_seed {
                judge = judge.with_seed(seed);
            }
            Some(judge)
        } else {
            None
        };

        let mut synthesizer =
            ConsensusSynthesizer::new().with_human_review_threshold(config.human_review_threshold);
        if let Some(writer) = self.writer {
            synthesizer = synthesizer.with_writer(writer);
        }

        let pool = ProposerPool::new(self.registry, raters)
            .with_base_temperature(config.base_temperature)
            .with_max_tokens(config.max_tokens)
            .with_request_timeout(config.request_timeout());

        let jury: Arc<dyn JuryProcess> = match self.jury {
            Some(jury) => jury,
            None => Arc::new(ConvergencePanel::new(config.jury_max_rounds)),
        };

        Ok(CommitteeOrchestrator {
            config,
            jury,
            pool: Arc::new(pool),
            coordinator: self.coordinator.unwrap_or_default(),
            rules: RuleBasedJudge::new(),
            pairwise,
            synthesizer,
            verdicts: UnanimousConsensus::new(),
            store: self.store,
        })
    }
}

/// Top-level deliberation pipeline.
pub struct CommitteeOrchestrator {
    config: CommitteeConfig,
    pool: Arc<ProposerPool>,
    coordinator: Arc<DecisionCoordinator>,
    rules: RuleBasedJudge,
    pairwise: Option<PairwiseJudge>,
    synthesizer: ConsensusSynthesizer,
    jury: Arc<dyn JuryProcess>,
    verdicts: UnanimousConsensus,
    store: Option<Arc<dyn DecisionStore>>,
}

/// Judge stage output.
struct Judgement {
    evaluations: Vec<Evaluation>,
    comparisons: Vec<PairwiseComparison>,
    tokens: TokenUsage,
}

impl CommitteeOrchestrator {
    pub fn builder() -> CommitteeOrchestratorBuilder {
        CommitteeOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &CommitteeConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<DecisionCoordinator> {
        &self.coordinator
    }

    /// Run `input` through the committee.
    pub async fn deliberate_and_decide(
        &self,
        input: &DisputeInput,
        sink: &dyn EventSink,
    ) -> CommitteeResult<CommitteeDecision> {
        validate_input(input)?;
        let subject_id = input.subject_id.as_str();
        if !self.coordinator.try_start(subject_id) {
            return Err(CommitteeError::AlreadyRunning {
                subject_id: subject_id.to_string(),
            });
        }

        let method = input.method.unwrap_or(self.config.consensus_method);
        let span = otel::deliberation_span(subject_id, method.as_str());
        let started = Instant::now();
        let limit = self.config.deliberation_timeout();

        let result = match tokio::time::timeout(limit, self.run(input, sink))
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(CommitteeError::Timeout(limit)),
        };

        match result {
            Ok(decision) => {
                self.coordinator
                    .finish(subject_id, Some(self.config.cooldown()));
                otel::record_deliberation_result(
                    &span,
                    &decision.final_winner,
                    decision.final_confidence,
                    decision.escalated(),
                    elapsed_ms(started),
                    decision.metrics.total_tokens,
                );
                info!(
                    subject_id,
                    winner = %decision.final_winner,
                    confidence = decision.final_confidence,
                    escalated = decision.escalated(),
                    elapsed_ms = elapsed_ms(started),
                    "Committee decided"
                );
                Ok(decision)
            }
            Err(e) => {
                self.coordinator
                    .set_cooldown(subject_id, self.config.failure_cooldown());
                otel::record_deliberation_failure(&span, elapsed_ms(started));
                warn!(subject_id, error = %e, "Committee deliberation failed");
                sink.emit(ProgressEvent::progress(
                    subject_id,
                    DeliberationPhase::Failed,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        input: &DisputeInput,
        sink: &dyn EventSink,
    ) -> CommitteeResult<CommitteeDecision> {
        let started = Instant::now();
        let subject_id = input.subject_id.as_str();
        let cost = self.config.cost_per_1k_tokens;
        let mut metrics = DecisionMetrics {
            prompt_version: PROMPT_VERSION.to_string(),
            ..Default::default()
        };

        sink.emit(ProgressEvent::progress(
            subject_id,
            DeliberationPhase::Started,
            format!("Deliberating: {}", input.question),
        ));

        // ── Proposals ──
        let stage_start = Instant::now();
        let per_rater = self.config.max_proposals_per_agent;
        metrics.proposals_requested = self.pool.raters().len() * per_rater;
        sink.emit(ProgressEvent::progress(
            subject_id,
            DeliberationPhase::Proposing,
            format!(
                "Requesting {} proposals from {} raters",
                metrics.proposals_requested,
                self.pool.raters().len()
            ),
        ));

        let proposals = self.collect_proposals(input, per_rater).await;
        let mut usage = TokenUsage::default();
        for p in &proposals {
            usage.add(p.generation().tokens);
            sink.emit(
                ProgressEvent::new(
                    subject_id,
                    DeliberationPhase::Proposing,
                    MessageType::Proposal,
                    format!(
                        "{} → {} ({:.2})",
                        p.rater_name(),
                        p.winner_choice(),
                        p.confidence()
                    ),
                )
                .with_tokens(p.generation().tokens)
                .with_duration_ms(p.generation().latency_ms),
            );
        }
        metrics.proposals_received = proposals.len();
        metrics.record_stage(StageUsage::new(
            Stage::Proposing,
            usage.total as u64,
            elapsed_ms(stage_start),
            cost,
        ));

        if proposals.len() < self.config.min_proposals {
            return Err(CommitteeError::InsufficientProposals {
                got: proposals.len(),
                need: self.config.min_proposals,
            });
        }

        // ── Judging ──
        let stage_start = Instant::now();
        let judge_span =
            otel::judge_span(subject_id, &self.config.judge_mode.to_string(), proposals.len());
        let judgement = self
            .judge(input, &proposals, sink)
            .instrument(judge_span.clone())
            .await;
        otel::record_duration(&judge_span, elapsed_ms(stage_start));
        usage.add(judgement.tokens);
        metrics.record_stage(StageUsage::new(
            Stage::Judging,
            judgement.tokens.total as u64,
            elapsed_ms(stage_start),
            cost,
        ));

        // ── Synthesis ──
        let stage_start = Instant::now();
        let method = input.method.unwrap_or(self.config.consensus_method);
        let synthesis_span = otel::synthesis_span(subject_id, method.as_str(), proposals.len());
        let weights: HashMap<String, f64> = self
            .pool
            .raters()
            .iter()
            .map(|r| (r.id.clone(), r.weight))
            .collect();
        let consensus = self
            .synthesizer
            .synthesize(&proposals, &judgement.evaluations, method, &weights)
            .instrument(synthesis_span.clone())
            .await?;
        otel::record_synthesis_result(
            &synthesis_span,
            &consensus.winner_choice,
            consensus.confidence_level,
        );
        sink.emit(
            ProgressEvent::new(
                subject_id,
                DeliberationPhase::Synthesizing,
                MessageType::Synthesis,
                format!(
                    "{} by {} at {:.2} (residual {:.2})",
                    consensus.winner_choice,
                    method,
                    consensus.confidence_level,
                    consensus.residual_uncertainty
                ),
            )
            .with_tokens(consensus.reasoning_tokens)
            .with_duration_ms(elapsed_ms(stage_start)),
        );
        usage.add(consensus.reasoning_tokens);
        metrics.consensus_level = consensus.confidence_level;
        metrics.record_stage(StageUsage::new(
            Stage::Synthesizing,
            consensus.reasoning_tokens.total as u64,
            elapsed_ms(stage_start),
            cost,
        ));

        // ── Jury ──
        let mut final_winner = consensus.winner_choice.clone();
        let jury = if self.should_escalate(input, &consensus) {
            let stage_start = Instant::now();
            let report = self
                .consult_jury(input, &proposals, &consensus, sink)
                .await;
            if report.verdict_applied {
                if let Some(choice) = report.outcome.verdict.to_choice(&input.party_a, &input.party_b)
                {
                    final_winner = choice.to_string();
                }
            }
            metrics.escalated = true;
            metrics.record_stage(StageUsage::new(
                Stage::Jury,
                0,
                elapsed_ms(stage_start),
                cost,
            ));
            Some(report)
        } else {
            None
        };

        metrics.wall_clock_ms = elapsed_ms(started);
        let decision = CommitteeDecision::assemble(DecisionDraft {
            subject_id: subject_id.to_string(),
            final_winner,
            proposals,
            evaluations: judgement.evaluations,
            comparisons: judgement.comparisons,
            consensus,
            jury,
            metrics,
        })?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&decision).await {
                warn!(subject_id, decision_id = %decision.id, error = %e, "Failed to persist decision");
            }
        }

        sink.emit(
            ProgressEvent::progress(
                subject_id,
                DeliberationPhase::Completed,
                decision.summary_line(),
            )
            .with_tokens(TokenUsage {
                total: decision.metrics.total_tokens.min(u32::MAX as u64) as u32,
                ..usage
            })
            .with_duration_ms(decision.metrics.wall_clock_ms),
        );
        Ok(decision)
    }

    /// One task per rater; results are reordered to rater order.
    async fn collect_proposals(&self, input: &DisputeInput, per_rater: usize) -> Vec<AgentProposal> {
        let mut tasks = JoinSet::new();
        for (index, rater) in self.pool.raters().iter().enumerate() {
            let pool = Arc::clone(&self.pool);
            let rater = rater.clone();
            let input = input.clone();
            let span =
                otel::proposal_span(&input.subject_id, &rater.id, &rater.provider, per_rater);
            tasks.spawn(
                async move {
                    let started = Instant::now();
                    let proposals = pool.generate_proposals(&rater, &input, per_rater).await;
                    let tokens: u64 = proposals
                        .iter()
                        .map(|p| p.generation().tokens.total as u64)
                        .sum();
                    otel::record_proposal_result(
                        &tracing::Span::current(),
                        !proposals.is_empty(),
                        elapsed_ms(started),
                        tokens,
                    );
                    (index, proposals)
                }
                .instrument(span),
            );
        }

        let mut by_rater: Vec<(usize, Vec<AgentProposal>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(batch) => by_rater.push(batch),
                Err(e) => warn!(error = %e, "Proposal task aborted"),
            }
        }
        by_rater.sort_by_key(|(index, _)| *index);
        by_rater.into_iter().flat_map(|(_, batch)| batch).collect()
    }

    async fn judge(
        &self,
        input: &DisputeInput,
        proposals: &[AgentProposal],
        sink: &dyn EventSink,
    ) -> Judgement {
        let mode = self.config.judge_mode;
        let subject_id = input.subject_id.as_str();

        let comparisons = match (&self.pairwise, mode.uses_pairwise()) {
            (Some(judge), true) => {
                judge
                    .compare_all(&input.question, proposals, self.config.pairwise_rounds)
                    .await
            }
            _ => Vec::new(),
        };
        let mut tokens = TokenUsage::default();
        for c in &comparisons {
            tokens.add(c.tokens);
            sink.emit(
                ProgressEvent::new(
                    subject_id,
                    DeliberationPhase::Judging,
                    MessageType::Comparison,
                    format!(
                        "{} vs {}: {} ({:.2}, strength {:.2})",
                        c.proposal_a_id,
                        c.proposal_b_id,
                        c.winner,
                        c.confidence,
                        c.consensus_strength
                    ),
                )
                .with_tokens(c.tokens),
            );
        }
        let ranks = rank_by_pairwise(proposals, &comparisons);
        let rank_of = |p: &AgentProposal| ranks.get(p.id()).copied().unwrap_or(0.5);

        let evaluations: Vec<Evaluation> = match mode {
            JudgeMode::RuleBased => self.rules.evaluate_all(proposals),
            JudgeMode::Pairwise => proposals
                .iter()
                .map(|p| Evaluation::from_pairwise(p.id(), p.rater_id(), rank_of(p)))
                .collect(),
            JudgeMode::Hybrid => proposals
                .iter()
                .map(|p| self.rules.evaluate(p).blend_with_pairwise(rank_of(p)))
                .collect(),
        };

        for e in &evaluations {
            sink.emit(ProgressEvent::new(
                subject_id,
                DeliberationPhase::Judging,
                MessageType::Evaluation,
                format!("{} scored {:.2}", e.rater_id, e.overall()),
            ));
        }
        debug!(
            subject_id,
            mode = %mode,
            evaluations = evaluations.len(),
            comparisons = comparisons.len(),
            tokens = tokens.total,
            "Judging complete"
        );

        Judgement {
            evaluations,
            comparisons,
            tokens,
        }
    }

    fn should_escalate(&self, input: &DisputeInput, consensus: &ConsensusResult) -> bool {
        input.force_jury
            || (consensus.confidence_level < self.config.consensus_threshold
                && !self.config.enable_early_exit)
    }

    async fn consult_jury(
        &self,
        input: &DisputeInput,
        proposals: &[AgentProposal],
        consensus: &ConsensusResult,
        sink: &dyn EventSink,
    ) -> JuryReport {
        let subject_id = input.subject_id.as_str();
        let started = Instant::now();
        let span = otel::jury_span(subject_id);
        sink.emit(ProgressEvent::progress(
            subject_id,
            DeliberationPhase::Jury,
            format!(
                "Escalating to jury (confidence {:.2}, threshold {:.2})",
                consensus.confidence_level, self.config.consensus_threshold
            ),
        ));

        let (deliberation, outcome) = match self
            .jury
            .deliberate(input, proposals, consensus, sink)
            .instrument(span.clone())
            .await
        {
            Ok(deliberation) => {
                let outcome = self.verdicts.evaluate(&deliberation);
                (Some(deliberation), outcome)
            }
            Err(e) => {
                warn!(subject_id, error = %e, "Jury deliberation failed");
                (None, JuryOutcome::failed(e.to_string()))
            }
        };
        otel::record_jury_result(&span, outcome.rounds, outcome.confidence, elapsed_ms(started));

        let verdict_choice = outcome
            .verdict
            .to_choice(&input.party_a, &input.party_b)
            .filter(|choice| proposals.iter().any(|p| p.winner_choice() == *choice));
        let verdict_applied =
            verdict_choice.is_some() && outcome.confidence > consensus.confidence_level;

        sink.emit(
            ProgressEvent::new(
                subject_id,
                DeliberationPhase::Jury,
                MessageType::Vote,
                format!(
                    "Jury verdict {} at {:.2}{}",
                    outcome.verdict,
                    outcome.confidence,
                    if verdict_applied { " (applied)" } else { "" }
                ),
            )
            .with_duration_ms(elapsed_ms(started)),
        );
        info!(
            subject_id,
            verdict = %outcome.verdict,
            confidence = outcome.confidence,
            unanimous = outcome.unanimous,
            applied = verdict_applied,
            "Jury consulted"
        );

        JuryReport {
            deliberation,
            outcome,
            verdict_applied,
        }
    }
}

fn validate_input(input: &DisputeInput) -> CommitteeResult<()> {
    if input.subject_id.trim().is_empty() {
        return Err(CommitteeError::Validation("subject id must not be empty".into()));
    }
    if input.question.trim().is_empty() {
        return Err(CommitteeError::Validation("question must not be empty".into()));
    }
    let (a, b) = (input.party_a.trim(), input.party_b.trim());
    if a.is_empty() || b.is_empty() {
        return Err(CommitteeError::Validation("party ids must not be empty".into()));
    }
    if a == b {
        return Err(CommitteeError::Validation(format!(
            "party ids must be distinct, both are {a}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_input() {
        let ok = DisputeInput::new("s", "Who is right?", "alice", "bob");
        assert!(validate_input(&ok).is_ok());

        let same = DisputeInput::new("s", "Who is right?", "alice", "alice");
        assert!(matches!(
            validate_input(&same),
            Err(CommitteeError::Validation(_))
        ));

        let blank = DisputeInput::new(" ", "Who is right?", "alice", "bob");
        assert!(validate_input(&blank).is_err());
    }

    #[test]
    fn test_build_rejects_empty_raters() {
        let result = CommitteeOrchestrator::builder().build();
        assert!(matches!(result, Err(CommitteeError::Validation(_))));
    }
}
