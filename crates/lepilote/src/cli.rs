// CLI Interface
//
// Validate an orchestrator configuration, rank an exported stats file, or
// dry-run the full lifecycle against the in-process simulated engine.

use anyhow::{bail, Context, Result as AnyhowResult};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leorchestre::{
    rank_entrants, CancellationSignal, EntrantStats, KickoffMode, Orchestrator,
    OrchestratorConfig, Outcome, RankedEntrant, SimulatedEngine,
};

/// LePilote - Tournament Lifecycle Pilot
#[derive(Parser, Debug)]
#[command(name = "lepilote")]
#[command(author = "LeTournoi Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Schedule, run and rank tournaments on a remote game engine", long_about = None)]
pub struct Cli {
    /// Orchestrator configuration file (TOML)
    #[arg(global = true, long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then print the effective values
    Validate,

    /// Rank an exported entrant stats file (JSON array)
    Rank {
        /// Path to the stats file
        #[arg(value_name = "STATS")]
        stats_file: PathBuf,

        /// Print the ranking as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Drive a full tournament against the simulated engine
    Simulate {
        /// Entrants to register (overrides the configuration)
        #[arg(long = "entrants")]
        entrants: Option<i64>,

        /// Entrants available in the simulated pool
        #[arg(long = "pool", default_value = "100")]
        pool: u32,

        /// Status polls before the simulated tournament ends
        #[arg(long = "ticks", default_value = "5")]
        ticks: u32,

        /// Leading failed calls per operation, to exercise retries
        #[arg(long = "outages", default_value = "0")]
        outages: u32,

        /// Kick off right after registration
        #[arg(long = "direct")]
        direct: bool,

        /// Poll interval in milliseconds (overrides the configuration)
        #[arg(long = "poll-ms")]
        poll_ms: Option<u64>,

        /// Pre-kickoff wait in milliseconds (overrides the configuration)
        #[arg(long = "wait-ms")]
        wait_ms: Option<u64>,

        /// Print the outcome as JSON
        #[arg(long = "json")]
        json: bool,
    },
}

impl Cli {
    /// Run the CLI
    pub async fn run(self) -> AnyhowResult<()> {
        init_logging(self.verbose);

        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Validate => cmd_validate(&config),
            Commands::Rank { stats_file, json } => cmd_rank(&stats_file, json),
            Commands::Simulate {
                entrants,
                pool,
                ticks,
                outages,
                direct,
                poll_ms,
                wait_ms,
                json,
            } => {
                let mut config = config;
                if let Some(entrants) = entrants {
                    config.tournament.entrant_count = entrants;
                }
                if let Some(poll_ms) = poll_ms {
                    config.poll_interval_ms = poll_ms;
                }
                if let Some(wait_ms) = wait_ms {
                    config.tournament.pre_kickoff_wait_ms = wait_ms;
                }
                if direct {
                    config.kickoff_mode = KickoffMode::Direct;
                }
                let engine = SimulatedEngine::new()
                    .with_pool_size(pool)
                    .with_ticks_to_end(ticks)
                    .with_transient_failures(outages);
                cmd_simulate(config, engine, json).await
            }
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Defaults, then the optional TOML file, then environment overrides.
pub fn load_config(path: Option<&Path>) -> AnyhowResult<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    Ok(config.apply_env())
}

/// Parse an exported stats file.
pub fn read_stats(path: &Path) -> AnyhowResult<Vec<EntrantStats>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stats file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse stats file {}", path.display()))
}

/// Plain-text ranking table.
pub fn render_ranking(ranking: &[RankedEntrant]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>5}  {:>10}  {:>10}  {:>8}  {:>6}\n",
        "RANK", "ENTRANT", "CHIPS", "BUSTED", "HANDS"
    ));
    for entry in ranking {
        let busted = entry
            .stats
            .busted_order
            .map(|order| format!("#{order}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>5}  {:>10}  {:>10}  {:>8}  {:>6}\n",
            entry.rank, entry.entrant_id, entry.stats.final_chips, busted, entry.stats.hands_played
        ));
    }
    out
}

fn cmd_validate(config: &OrchestratorConfig) -> AnyhowResult<()> {
    config.validate().context("Invalid orchestrator configuration")?;
    let plan = config
        .tournament
        .validate(Utc::now())
        .context("Invalid tournament parameters")?;

    info!(
        name = %plan.name,
        entrants = plan.entrant_count,
        start_time = %plan.start_time.to_rfc3339(),
        "configuration valid"
    );

    let rendered = toml::to_string_pretty(&config.redacted())
        .context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

fn cmd_rank(stats_file: &Path, json: bool) -> AnyhowResult<()> {
    let stats = read_stats(stats_file)?;
    let ranking = rank_entrants(&stats);
    info!(entrants = ranking.len(), "ranking computed");

    if json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
    } else {
        print!("{}", render_ranking(&ranking));
    }
    Ok(())
}

async fn cmd_simulate(config: OrchestratorConfig, engine: SimulatedEngine, json: bool) -> AnyhowResult<()> {
    let engine = Arc::new(engine);
    let orchestrator = Orchestrator::new(&config, Arc::clone(&engine), Arc::clone(&engine))
        .context("Invalid orchestrator configuration")?;

    let cancel = CancellationSignal::new();
    let signal = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling tournament");
            signal.cancel();
        }
    });

    let outcome = orchestrator.run(&config.tournament, &cancel).await;
    ctrl_c.abort();

    if json {
        println!("{}", outcome.to_json_pretty()?);
    } else {
        print!("{}", outcome.summary());
    }

    match outcome {
        Outcome::Completed { .. } => Ok(()),
        Outcome::Failed { phase, cause, .. } => bail!("tournament failed during {phase}: {cause}"),
        Outcome::Cancelled { phase, .. } => bail!("tournament cancelled during {phase}"),
    }
}
