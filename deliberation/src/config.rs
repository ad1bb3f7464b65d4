//! Committee configuration.
//!
//! Resolution order: built-in defaults ← TOML file ← `COMMITTEE_*` environment
//! variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::ConsensusMethod;
use crate::judge::{BiasMitigation, JudgeMode};
use crate::proposal::{RaterProfile, MAX_RATER_WEIGHT, MIN_RATER_WEIGHT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeConfig {
    pub consensus_method: ConsensusMethod,
    pub judge_mode: JudgeMode,
    /// Rounds per pairwise comparison (1 when `bias.multiple_rounds` is off).
    pub pairwise_rounds: u32,
    /// Fewer proposals than this aborts the run.
    pub min_proposals: usize,
    /// Attempts per rater.
    pub max_proposals_per_agent: usize,
    /// Below this calibrated confidence the jury is consulted.
    pub consensus_threshold: f64,
    /// Accept low-confidence consensus without a jury.
    pub enable_early_exit: bool,
    /// Residual uncertainty above this flags human review.
    pub human_review_threshold: f64,
    pub base_temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
    pub deliberation_timeout_ms: u64,
    /// Cooldown after a successful decision.
    pub cooldown_ms: u64,
    /// Cooldown after a failed run.
    pub failure_cooldown_ms: u64,
    pub jury_max_rounds: u32,
    /// Flat price used for per-stage cost estimates. Zero disables costing.
    pub cost_per_1k_tokens: f64,
    pub bias: BiasMitigation,
    pub raters: Vec<RaterProfile>,
    /// Per-rater weight overrides, keyed by rater id.
    pub agent_weights: HashMap<String, f64>,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            consensus_method: ConsensusMethod::Majority,
            judge_mode: JudgeMode::RuleBased,
            pairwise_rounds: 3,
            min_proposals: 2,
            max_proposals_per_agent: 1,
            consensus_threshold: 0.6,
            enable_early_exit: false,
            human_review_threshold: 0.4,
            base_temperature: 0.3,
            max_tokens: 1024,
            request_timeout_ms: 60_000,
            deliberation_timeout_ms: 300_000,
            cooldown_ms: 15_000,
            failure_cooldown_ms: 60_000,
            jury_max_rounds: 5,
            cost_per_1k_tokens: 0.0,
            bias: BiasMitigation::default(),
            raters: Vec::new(),
            agent_weights: HashMap::new(),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl CommitteeConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Defaults, then the TOML file at `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `COMMITTEE_*` overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("COMMITTEE_CONSENSUS_METHOD") {
            if let Ok(m) = val.parse() {
                self.consensus_method = m;
            }
        }
        if let Some(val) = lookup("COMMITTEE_JUDGE_MODE") {
            if let Ok(m) = val.parse() {
                self.judge_mode = m;
            }
        }
        if let Some(val) = lookup("COMMITTEE_RANDOMIZE_ORDER") {
            self.bias.randomize_order = parse_bool(&val);
        }
        if let Some(val) = lookup("COMMITTEE_MASK_AGENT_NAMES") {
            self.bias.mask_agent_names = parse_bool(&val);
        }
        if let Some(val) = lookup("COMMITTEE_NORMALIZE_LENGTH") {
            self.bias.normalize_length = parse_bool(&val);
        }
        if let Some(val) = lookup("COMMITTEE_MULTIPLE_ROUNDS") {
            self.bias.multiple_rounds = parse_bool(&val);
        }
        if let Some(val) = lookup("COMMITTEE_PAIRWISE_ROUNDS") {
            if let Ok(n) = val.parse() {
                self.pairwise_rounds = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_MIN_PROPOSALS") {
            if let Ok(n) = val.parse() {
                self.min_proposals = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_MAX_PROPOSALS_PER_AGENT") {
            if let Ok(n) = val.parse() {
                self.max_proposals_per_agent = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_CONSENSUS_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.consensus_threshold = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_ENABLE_EARLY_EXIT") {
            self.enable_early_exit = parse_bool(&val);
        }
        if let Some(val) = lookup("COMMITTEE_HUMAN_REVIEW_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.human_review_threshold = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_BASE_TEMPERATURE") {
            if let Ok(n) = val.parse() {
                self.base_temperature = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_MAX_TOKENS") {
            if let Ok(n) = val.parse() {
                self.max_tokens = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_REQUEST_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.request_timeout_ms = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_DELIBERATION_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.deliberation_timeout_ms = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_COOLDOWN_MS") {
            if let Ok(n) = val.parse() {
                self.cooldown_ms = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_FAILURE_COOLDOWN_MS") {
            if let Ok(n) = val.parse() {
                self.failure_cooldown_ms = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_JURY_MAX_ROUNDS") {
            if let Ok(n) = val.parse() {
                self.jury_max_rounds = n;
            }
        }
        if let Some(val) = lookup("COMMITTEE_COST_PER_1K_TOKENS") {
            if let Ok(n) = val.parse() {
                self.cost_per_1k_tokens = n;
            }
        }
        // id:provider[:model], comma separated
        if let Some(val) = lookup("COMMITTEE_RATERS") {
            let raters = parse_rater_list(&val);
            if !raters.is_empty() {
                self.raters = raters;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_proposals < 1 {
            return Err(ConfigError::Invalid("min_proposals must be at least 1".into()));
        }
        if self.max_proposals_per_agent < 1 {
            return Err(ConfigError::Invalid(
                "max_proposals_per_agent must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            return Err(ConfigError::Invalid(format!(
                "consensus_threshold must be in [0, 1], got {}",
                self.consensus_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.human_review_threshold) {
            return Err(ConfigError::Invalid(format!(
                "human_review_threshold must be in [0, 1], got {}",
                self.human_review_threshold
            )));
        }
        if self.pairwise_rounds < 1 {
            return Err(ConfigError::Invalid("pairwise_rounds must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 || self.deliberation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if !self.cost_per_1k_tokens.is_finite() || self.cost_per_1k_tokens < 0.0 {
            return Err(ConfigError::Invalid("cost_per_1k_tokens must be non-negative".into()));
        }
        if self.raters.is_empty() {
            return Err(ConfigError::Invalid("at least one rater is required".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for rater in &self.raters {
            if rater.id.trim().is_empty() {
                return Err(ConfigError::Invalid("rater id must not be empty".into()));
            }
            if !seen.insert(rater.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate rater id {}", rater.id)));
            }
        }
        if let Some((id, w)) = self.agent_weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(ConfigError::Invalid(format!("weight for {id} is not finite: {w}")));
        }
        Ok(())
    }

    /// Rounds per comparison after the multiple-rounds toggle.
    pub fn effective_pairwise_rounds(&self) -> u32 {
        if self.bias.multiple_rounds {
            self.pairwise_rounds.max(1)
        } else {
            1
        }
    }

    /// Rater weights with `agent_weights` overrides applied, clamped to [0.1, 1.0].
    pub fn rater_weights(&self) -> HashMap<String, f64> {
        let mut weights: HashMap<String, f64> = self
            .raters
            .iter()
            .map(|r| (r.id.clone(), r.weight))
            .collect();
        for (id, w) in &self.agent_weights {
            if w.is_finite() {
                weights.insert(id.clone(), w.clamp(MIN_RATER_WEIGHT, MAX_RATER_WEIGHT));
            }
        }
        weights
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn deliberation_timeout(&self) -> Duration {
        Duration::from_millis(self.deliberation_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }
}

/// Parse `id:provider[:model]` entries separated by commas.
pub fn parse_rater_list(list: &str) -> Vec<RaterProfile> {
    list.split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().splitn(3, ':');
            let id = parts.next()?.trim();
            let provider = parts.next()?.trim();
            if id.is_empty() || provider.is_empty() {
                return None;
            }
            let mut rater = RaterProfile::new(id, id, provider);
            if let Some(model) = parts.next().map(str::trim).filter(|m| !m.is_empty()) {
                rater = rater.with_model(model);
            }
            Some(rater)
        })
        .collect()
}
