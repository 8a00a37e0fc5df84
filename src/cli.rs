//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::WorkerMode;
use crate::report::ExportFormat;
use clap::Parser;
use std::path::PathBuf;

/// SiteBench - multi-site page load benchmark
///
/// Samples up to five sites from the target pool, measures each in an
/// isolated worker, scores the results and keeps the last five runs.
///
/// Examples:
///   sitebench --computer lab-1
///   sitebench --targets https://a.example,https://b.example --save-targets
///   sitebench --history
///   sitebench --export last_run.csv --format csv
///   sitebench --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Computer name recorded with the run
    ///
    /// Defaults to the configured name, then to the host name.
    #[arg(short = 'n', long, value_name = "NAME", env = "SITEBENCH_COMPUTER")]
    pub computer: Option<String>,

    /// Target pool for this run (comma-separated)
    ///
    /// Without this, the stored pool is used, then the configured defaults.
    #[arg(short, long, value_name = "URLS", value_delimiter = ',')]
    pub targets: Option<Vec<String>>,

    /// Read the target pool from a newline-delimited file
    #[arg(long, value_name = "FILE", conflicts_with = "targets")]
    pub targets_file: Option<PathBuf>,

    /// Store the given target pool for future runs
    #[arg(long)]
    pub save_targets: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .sitebench.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for persisted history and targets
    #[arg(long, value_name = "DIR", env = "SITEBENCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds to wait for a run before leaving it pending
    #[arg(long, value_name = "SECS")]
    pub wait: Option<u64>,

    /// How workers are isolated
    #[arg(long, value_name = "MODE")]
    pub worker_mode: Option<WorkerMode>,

    /// Per-site request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub request_timeout: Option<u64>,

    /// Fixed seed for target sampling
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Load time (ms) above which the resolver probe runs
    #[arg(long, value_name = "MS")]
    pub probe_threshold: Option<f64>,

    /// Never run the resolver probe
    #[arg(long)]
    pub no_probe: bool,

    /// Print run history and exit
    #[arg(long)]
    pub history: bool,

    /// Export the most recent run to FILE and exit
    #[arg(short, long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Export format (csv, json, markdown)
    #[arg(long, default_value = "csv", value_name = "FORMAT")]
    pub format: ExportFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .sitebench.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Worker mode: site to measure
    #[arg(long, hide = true, requires_all = ["worker_run_id", "worker_index"])]
    pub worker_site: Option<String>,

    /// Worker mode: run id to tag the result with
    #[arg(long, hide = true, requires = "worker_site")]
    pub worker_run_id: Option<u64>,

    /// Worker mode: ordinal to tag the result with
    #[arg(long, hide = true, requires = "worker_site")]
    pub worker_index: Option<usize>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether this process was launched as a worker.
    pub fn is_worker(&self) -> bool {
        self.worker_site.is_some()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config and worker mode
        if self.init_config || self.is_worker() {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.history && self.export.is_some() {
            return Err("Cannot use both --history and --export".to_string());
        }

        if let Some(wait) = self.wait {
            if wait == 0 {
                return Err("Wait must be at least 1 second".to_string());
            }
        }

        if let Some(timeout) = self.request_timeout {
            if timeout == 0 {
                return Err("Request timeout must be at least 1 second".to_string());
            }
        }

        if let Some(threshold) = self.probe_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err("Probe threshold must be a non-negative number".to_string());
            }
        }

        if self.save_targets && self.targets.is_none() && self.targets_file.is_none() {
            return Err("--save-targets needs --targets or --targets-file".to_string());
        }

        if let Some(ref targets) = self.targets {
            for target in targets {
                let target = target.trim();
                if !target.starts_with("http://") && !target.starts_with("https://") {
                    return Err(format!(
                        "Target must start with 'http://' or 'https://': {}",
                        target
                    ));
                }
            }
        }

        if let Some(ref path) = self.targets_file {
            if !path.is_file() {
                return Err(format!("Targets file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
