//! distributor CLI - Resumable batched asset distribution.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use distributor::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InflightMarker};
use distributor::pipeline::count_lines;
use distributor::{
    BatchRunner, Config, DistributorError, DryRunSubmitter, MemoryCheckpointStore, RunStats,
    RunnerOptions, SubmissionJournal, SubstrateSubmitter,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "distributor")]
#[command(version)]
#[command(about = "Resumable batched asset distribution to a Substrate chain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "distributor.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint the asset for every record past the checkpoint
    Distribute {
        /// Snapshot JSONL file (overrides files.snapshot)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Drop a leftover in-flight marker after checking the chain by hand
        #[arg(long)]
        discard_inflight: bool,
    },

    /// Show the batches a distribution would submit, without a node
    Plan {
        /// Snapshot JSONL file (overrides files.snapshot)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Show the checkpoint and any unresolved batch
    Status,

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# distributor configuration file

[node]
url = "wss://rococo-asset-hub-rpc.dwellir.com"
connect_retries = 3
retry_backoff_ms = 1000
# Maximum wait for finalization per batch, 0 waits forever
finality_timeout_secs = 600

[signer]
# Hex sr25519 seed read from this environment variable (.env is loaded)
seed_env = "PRIVATE_KEY"
# seed = "${MY_SEED}"

[distribution]
asset_id = 47
batch_size = 300
amount_multiplier = 1000
freeze = true
remark_prefix = "Asset"

[files]
snapshot = "snapshot.jsonl"
log = "logs/distribution.log"
last_line = "lastKeyAsset.txt"
current_batch = "currentBatchAsset.txt"
inflight = "inflightBatchAsset.json"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn checkpoint_store(config: &Config) -> FileCheckpointStore {
    FileCheckpointStore::new(&config.files.last_line, &config.files.current_batch)
}

fn runner_options(config: &Config, discard_inflight: bool) -> RunnerOptions {
    RunnerOptions {
        batch_size: config.distribution.batch_size,
        finality_timeout: config.node.finality_timeout(),
        discard_inflight,
    }
}

fn progress_bar(snapshot: &Path) -> Result<ProgressBar> {
    let total = count_lines(snapshot)?;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn print_stats(title: &str, stats: &RunStats) {
    println!("\n=== {title} ===");
    println!("Batches:     {}", stats.batches_submitted);
    println!("Records:     {}", stats.records_submitted);
    println!("Skipped:     {}", stats.records_skipped);
    println!("Last line:   {}", stats.last_processed_line);
    println!("Next batch:  {}", stats.current_batch_number);
    println!("Throughput:  {:.0} records/hr", stats.throughput_per_hour);
    println!("Runtime:     {:.1}s", stats.runtime_secs);
}

fn print_plan(start: Checkpoint, history: &[Checkpoint]) {
    println!("\n=== Batch Plan ===");
    let mut previous = start;
    for checkpoint in history {
        println!(
            "Batch {:>6}: lines {}..={} ({} records)",
            previous.current_batch_number,
            previous.last_processed_line + 1,
            checkpoint.last_processed_line,
            checkpoint.last_processed_line - previous.last_processed_line
        );
        previous = *checkpoint;
    }
    if history.is_empty() {
        println!("Nothing to submit");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config
                .resolve_seed()
                .context("Failed to resolve signer seed")?;

            info!("Configuration is valid");
            info!("  Node: {}", config.node.url);
            info!(
                "  Asset: {} x{} (freeze: {})",
                config.distribution.asset_id,
                config.distribution.amount_multiplier,
                config.distribution.freeze
            );
            info!("  Batch size: {}", config.distribution.batch_size);
            return Ok(());
        }

        Commands::Status => {
            let config = load_config(&cli.config)?;
            let checkpoint = checkpoint_store(&config).load()?;

            println!("Last processed line:  {}", checkpoint.last_processed_line);
            println!("Current batch number: {}", checkpoint.current_batch_number);

            match InflightMarker::new(&config.files.inflight).recover()? {
                Some(inflight) => {
                    println!("\nUnresolved batch {}", inflight.batch_number);
                    println!("  Nonce:   {}", inflight.nonce);
                    println!("  Lines:   {}..={}", inflight.first_line, inflight.last_line);
                    println!(
                        "  Hash:    {}",
                        inflight.tx_hash.as_deref().unwrap_or("unknown")
                    );
                    println!("  Started: {}", inflight.started_at);
                }
                None => println!("No batch in flight"),
            }
        }

        Commands::Plan { snapshot } => {
            let config = load_config(&cli.config)?;
            let snapshot = snapshot.unwrap_or_else(|| config.files.snapshot.clone());
            let start = checkpoint_store(&config).load()?;

            if let Some(inflight) = InflightMarker::new(&config.files.inflight).recover()? {
                warn!(
                    batch = inflight.batch_number,
                    nonce = inflight.nonce,
                    "Unresolved in-flight batch: distribute will refuse to start until it is \
                     verified on chain and discarded; the plan below assumes it was not applied"
                );
            }

            let mut runner = BatchRunner::new(
                DryRunSubmitter::default(),
                MemoryCheckpointStore::starting_at(start),
                SubmissionJournal::disabled(),
                InflightMarker::disabled(),
                runner_options(&config, false),
            )?;
            let stats = runner.run(&snapshot).await?;

            print_plan(start, runner.store().history());
            print_stats("Distribution Plan", &stats);
        }

        Commands::Distribute {
            snapshot,
            discard_inflight,
        } => {
            let config = load_config(&cli.config)?;
            let snapshot = snapshot.unwrap_or_else(|| config.files.snapshot.clone());
            let seed = config
                .resolve_seed()
                .context("Failed to resolve signer seed")?;

            let submitter =
                SubstrateSubmitter::connect(&config.node, &config.distribution, seed).await?;
            let journal = SubmissionJournal::open(&config.files.log)?;

            let mut runner = BatchRunner::new(
                submitter,
                checkpoint_store(&config),
                journal,
                InflightMarker::new(&config.files.inflight),
                runner_options(&config, discard_inflight),
            )?
            .with_progress(progress_bar(&snapshot)?);

            let stats = match runner.run(&snapshot).await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(error = %e, "Distribution halted");
                    if e.is_resumable() {
                        warn!(
                            batch = e.batch(),
                            "Checkpoint is intact, re-run distribute to resubmit the failed batch"
                        );
                    } else if matches!(
                        e,
                        DistributorError::OutcomeUnknown { .. }
                            | DistributorError::FinalityTimeout { .. }
                            | DistributorError::StatusStreamClosed { .. }
                    ) {
                        warn!(
                            batch = e.batch(),
                            "Batch may still be included: check it on chain before running \
                             distribute --discard-inflight"
                        );
                    }
                    return Err(e.into());
                }
            };

            print_stats("Distribution Complete", &stats);
            println!("Log:         {:?}", config.files.log);
        }
    }

    Ok(())
}
