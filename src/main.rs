//! SiteBench - multi-site page load benchmark
//!
//! A CLI tool that samples a handful of sites from a target pool, measures
//! each one in an isolated worker, scores the results and keeps a short,
//! persisted history of finished runs.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Validation or runtime error, or the run did not complete in time

mod analysis;
mod cli;
mod config;
mod coordinator;
mod error;
mod history;
mod models;
mod probe;
mod report;
mod worker;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, WorkerMode};
use coordinator::{CoordinatorSettings, MessageChannel, RunCoordinator};
use history::{FileStore, HistoryStore, KeyValueStore};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Resolver, RunId, SpawnRequest};
use probe::DiagnosticProbe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use worker::{ProcessSpawner, TaskSpawner, WorkerSpawner};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    if args.is_worker() {
        return run_worker_mode(&args).await;
    }

    info!("SiteBench v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_app(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Benchmark failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .sitebench.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  .sitebench.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .sitebench.toml")?;

    println!("✅ Created .sitebench.toml with default settings.");
    println!("   Edit it to customize the target pool, probe endpoints and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Worker mode: measure one site and print its result line on stdout.
async fn run_worker_mode(args: &Args) -> Result<()> {
    let request = SpawnRequest {
        site: args.worker_site.clone().unwrap_or_default(),
        run_id: RunId(args.worker_run_id.unwrap_or_default()),
        index: args.worker_index.unwrap_or_default(),
    };
    debug!("Worker started: {}", request);

    let timeout = args
        .request_timeout
        .unwrap_or(config::BenchmarkConfig::default().request_timeout_seconds);
    let client = worker::http_client(timeout)?;

    let msg = worker::run_worker(&client, &request).await;
    println!("{}", msg.encode()?);
    Ok(())
}

/// Run the selected action. Returns the exit code.
async fn run_app(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.data_dir()));
    debug!("Data directory: {}", config.data_dir().display());

    if args.history {
        let history = HistoryStore::load(store, config.benchmark.history_limit);
        println!("{}", report::generate_history_listing(history.records()));
        return Ok(0);
    }

    if let Some(ref path) = args.export {
        return handle_export(&config, store, path, args.format);
    }

    let target_pool = resolve_targets(&args, &config, store.as_ref())?;
    info!("Target pool has {} sites", target_pool.len());

    run_benchmark(&args, &config, store, &target_pool).await
}

/// Export the newest run.
fn handle_export(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    path: &std::path::Path,
    format: report::ExportFormat,
) -> Result<i32> {
    let history = HistoryStore::load(store, config.benchmark.history_limit);

    let Some(record) = history.latest() else {
        eprintln!("No runs recorded yet; nothing to export.");
        return Ok(1);
    };

    report::write_export(record, format, path)?;
    println!("✅ Exported run {} to {}", record.id, path.display());
    Ok(0)
}

/// Pick the target pool: CLI list, then targets file, then stored pool,
/// then configured defaults.
fn resolve_targets(args: &Args, config: &Config, store: &dyn KeyValueStore) -> Result<Vec<String>> {
    let given = if let Some(ref targets) = args.targets {
        Some(
            targets
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>(),
        )
    } else if let Some(ref path) = args.targets_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read targets file: {}", path.display()))?;
        Some(history::store::parse_target_list(&text))
    } else {
        None
    };

    if let Some(targets) = given {
        if args.save_targets {
            match history::save_targets(store, &targets) {
                Ok(()) => info!("Saved {} targets", targets.len()),
                Err(e) => warn!("Failed to save target pool: {}", e),
            }
        }
        return Ok(targets);
    }

    if let Some(stored) = history::load_targets(store) {
        debug!("Using stored target pool");
        return Ok(stored);
    }

    debug!("Using default target pool");
    Ok(config.benchmark.default_targets.clone())
}

/// Build the spawner for the configured worker mode.
fn make_spawner(config: &Config) -> Result<Box<dyn WorkerSpawner>> {
    let timeout = config.benchmark.request_timeout_seconds;
    Ok(match config.benchmark.worker_mode {
        WorkerMode::Task => Box::new(TaskSpawner::new(timeout)?),
        WorkerMode::Process => Box::new(ProcessSpawner::current_exe(timeout)?),
    })
}

/// Start one run, wait for it, then report.
async fn run_benchmark(
    args: &Args,
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    target_pool: &[String],
) -> Result<i32> {
    let mut channel = MessageChannel::new();
    let Some(mut rx) = channel.subscribe() else {
        anyhow::bail!("Message channel already subscribed");
    };

    let settings = CoordinatorSettings {
        max_targets: config.benchmark.max_targets,
        probe_threshold_ms: config.probe.threshold_ms,
        seed: config.benchmark.seed,
    };
    let history = HistoryStore::load(store, config.benchmark.history_limit);
    let mut coordinator =
        RunCoordinator::new(make_spawner(config)?, channel.sender(), history, settings);

    let computer = config.computer_name();
    let run_id = match coordinator.start_run(target_pool, &computer) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("❌ Cannot start run: {}", e);
            return Ok(1);
        }
    };

    let expected = coordinator
        .active_run()
        .map(|run| run.expected_count)
        .unwrap_or_default();
    println!("🚀 Run {} started: measuring {} sites...", run_id, expected);

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(expected as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let wait = Duration::from_secs(config.general.wait_seconds);
    let outcome = tokio::time::timeout(
        wait,
        coordinator.wait_for_completion(&mut rx, |received, _| pb.set_position(received as u64)),
    )
    .await;
    pb.finish_and_clear();

    let done = match outcome {
        Ok(Some(done)) => done,
        Ok(None) => {
            eprintln!("❌ Run {} stopped receiving results.", run_id);
            return Ok(1);
        }
        Err(_) => {
            warn!("Run {} still pending after {}s", run_id, wait.as_secs());
            eprintln!(
                "⏳ Run {} did not complete within {}s; it was left pending.",
                run_id,
                wait.as_secs()
            );
            return Ok(1);
        }
    };

    println!("\n{}", report::generate_run_summary(&done.record));

    if done.probe_due && config.probe.enabled {
        match DiagnosticProbe::http(&config.probe) {
            Ok(probe) => {
                if let Some(result) = probe.run().await {
                    println!(
                        "\n🔎 {}",
                        report::generate_probe_summary(
                            &result,
                            probe.label(Resolver::A),
                            probe.label(Resolver::B)
                        )
                    );
                }
            }
            Err(e) => warn!("Diagnostic probe unavailable: {}", e),
        }
    }

    println!(
        "\n✅ Run complete. {} runs in history.",
        coordinator.history().len()
    );
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .sitebench.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
