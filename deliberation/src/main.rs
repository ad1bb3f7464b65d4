//! Committee deliberation CLI
//!
//! ```bash
//! # Decide a dispute with raters from the environment
//! OPENAI_API_KEY=... ANTHROPIC_API_KEY=... deliberation decide \
//!     --subject dispute-42 --question "Who breached the contract?" \
//!     --party-a acme --party-b globex
//!
//! # Validate and print the resolved configuration
//! COMMITTEE_CONSENSUS_METHOD=borda deliberation check-config --config committee.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use deliberation::consensus::GeneratedReasoning;
use deliberation::events::TracingSink;
use deliberation::{
    CommitteeConfig, CommitteeOrchestrator, ConsensusMethod, DisputeInput, GeneratorRegistry,
    JsonFileStore, RaterProfile,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one dispute through the committee and print the decision as JSON
    Decide {
        /// Subject id; one decision per subject runs at a time
        #[arg(long)]
        subject: String,

        #[arg(long)]
        question: String,

        /// Identifier of the first party
        #[arg(long)]
        party_a: String,

        /// Identifier of the second party
        #[arg(long)]
        party_b: String,

        /// Free-text background for the raters
        #[arg(long)]
        context: Option<String>,

        /// TOML config file (COMMITTEE_* variables still override it)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Consensus method override: majority, borda, weighted_voting, approval
        #[arg(long)]
        method: Option<ConsensusMethod>,

        /// Persist the decision as JSON under this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Always consult the jury
        #[arg(long, default_value_t = false)]
        jury: bool,

        /// Have the first rater's model write the consensus narrative
        #[arg(long, default_value_t = false)]
        narrate: bool,
    },

    /// Validate a configuration and print it resolved
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// One rater per registered provider when none are configured.
fn default_raters(registry: &GeneratorRegistry) -> Vec<RaterProfile> {
    registry
        .providers()
        .into_iter()
        .map(|provider| RaterProfile::new(provider.clone(), provider.clone(), provider))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("deliberation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::CheckConfig { config } => {
            let config = CommitteeConfig::load(config.as_deref()).context("loading config")?;
            config.validate().context("validating config")?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Decide {
            subject,
            question,
            party_a,
            party_b,
            context,
            config,
            method,
            store_dir,
            jury,
            narrate,
        } => {
            let mut config = CommitteeConfig::load(config.as_deref()).context("loading config")?;
            let registry = GeneratorRegistry::from_env();
            if registry.is_empty() {
                bail!("no generator available: set OPENAI_API_KEY or ANTHROPIC_API_KEY");
            }
            if config.raters.is_empty() {
                config.raters = default_raters(&registry);
                tracing::info!(raters = config.raters.len(), "Using one rater per provider");
            }

            let mut builder = CommitteeOrchestrator::builder().config(config.clone());
            if narrate {
                if let Some(first) = config.raters.first() {
                    let generator = registry.get(&first.provider)?;
                    builder = builder.reasoning_writer(Arc::new(GeneratedReasoning::new(
                        generator,
                        Duration::from_millis(config.request_timeout_ms),
                    )));
                }
            }
            if let Some(dir) = store_dir {
                builder = builder.store(Arc::new(JsonFileStore::new(dir)));
            }
            let orchestrator = builder.registry(registry).build()?;

            let mut input = DisputeInput::new(subject, question, party_a, party_b);
            if let Some(context) = context {
                input = input.with_context(context);
            }
            if let Some(method) = method {
                input = input.with_method(method);
            }
            if jury {
                input = input.with_jury();
            }

            let decision = orchestrator
                .deliberate_and_decide(&input, &TracingSink)
                .await?;
            tracing::info!("{}", decision.summary_line());
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
    }

    Ok(())
}
