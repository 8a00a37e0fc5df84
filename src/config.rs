//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.sitebench.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".sitebench.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Run settings.
    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    /// Diagnostic probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Name recorded with every run. Falls back to the host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,

    /// Directory holding persisted history and targets.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How long the CLI waits for a run before giving up on it.
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            computer_name: None,
            data_dir: default_data_dir(),
            wait_seconds: default_wait_seconds(),
        }
    }
}

fn default_data_dir() -> String {
    ".sitebench".to_string()
}

fn default_wait_seconds() -> u64 {
    120
}

/// How workers are isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// One tokio task per target (default)
    #[default]
    Task,
    /// One child process per target
    Process,
}

/// Run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Maximum targets sampled per run.
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,

    /// Number of finished runs kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Worker isolation.
    #[serde(default)]
    pub worker_mode: WorkerMode,

    /// Per-site request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Fixed sampling seed (random when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Target pool used when none is stored or given.
    #[serde(default = "default_targets")]
    pub default_targets: Vec<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            history_limit: default_history_limit(),
            worker_mode: WorkerMode::Task,
            request_timeout_seconds: default_request_timeout(),
            seed: None,
            default_targets: default_targets(),
        }
    }
}

fn default_max_targets() -> usize {
    crate::coordinator::DEFAULT_MAX_TARGETS
}

fn default_history_limit() -> usize {
    crate::history::store::DEFAULT_HISTORY_LIMIT
}

fn default_request_timeout() -> u64 {
    30
}

fn default_targets() -> Vec<String> {
    vec![
        "https://www.wikipedia.org",
        "https://www.rust-lang.org",
        "https://github.com",
        "https://www.mozilla.org",
        "https://news.ycombinator.com",
        "https://www.bbc.com",
        "https://docs.rs",
        "https://crates.io",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Diagnostic probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Run the probe after slow runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Load time (ms) that must be exceeded to trigger the probe.
    #[serde(default = "default_threshold")]
    pub threshold_ms: f64,

    #[serde(default = "default_label_a")]
    pub label_a: String,

    #[serde(default = "default_url_a")]
    pub url_a: String,

    #[serde(default = "default_label_b")]
    pub label_b: String,

    #[serde(default = "default_url_b")]
    pub url_b: String,

    /// Round-trip timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ms: default_threshold(),
            label_a: default_label_a(),
            url_a: default_url_a(),
            label_b: default_label_b(),
            url_b: default_url_b(),
            timeout_seconds: default_probe_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    crate::coordinator::DEFAULT_PROBE_THRESHOLD_MS
}

fn default_label_a() -> String {
    "Cloudflare".to_string()
}

fn default_url_a() -> String {
    "https://cloudflare-dns.com/dns-query?name=example.com&type=A".to_string()
}

fn default_label_b() -> String {
    "Google".to_string()
}

fn default_url_b() -> String {
    "https://dns.google/resolve?name=example.com&type=A".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref name) = args.computer {
            self.general.computer_name = Some(name.clone());
        }
        if let Some(ref dir) = args.data_dir {
            self.general.data_dir = dir.display().to_string();
        }
        if let Some(wait) = args.wait {
            self.general.wait_seconds = wait;
        }
        if let Some(mode) = args.worker_mode {
            self.benchmark.worker_mode = mode;
        }
        if let Some(timeout) = args.request_timeout {
            self.benchmark.request_timeout_seconds = timeout;
        }
        if let Some(seed) = args.seed {
            self.benchmark.seed = Some(seed);
        }
        if let Some(threshold) = args.probe_threshold {
            self.probe.threshold_ms = threshold;
        }
        // Flags always override
        if args.no_probe {
            self.probe.enabled = false;
        }
    }

    /// Reject settings that would break run or history limits.
    pub fn validate(&self) -> Result<()> {
        let max_targets = crate::coordinator::DEFAULT_MAX_TARGETS;
        if !(1..=max_targets).contains(&self.benchmark.max_targets) {
            bail!(
                "benchmark.max_targets must be between 1 and {}, got {}",
                max_targets,
                self.benchmark.max_targets
            );
        }

        let history_limit = crate::history::store::DEFAULT_HISTORY_LIMIT;
        if !(1..=history_limit).contains(&self.benchmark.history_limit) {
            bail!(
                "benchmark.history_limit must be between 1 and {}, got {}",
                history_limit,
                self.benchmark.history_limit
            );
        }

        Ok(())
    }

    /// Computer name to record: configured value, else the host name.
    ///
    /// May be empty, in which case starting a run fails validation.
    pub fn computer_name(&self) -> String {
        if let Some(ref name) = self.general.computer_name {
            return name.clone();
        }

        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default()
    }

    /// Directory for persisted state.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.benchmark.max_targets, 5);
        assert_eq!(config.benchmark.history_limit, 5);
        assert_eq!(config.probe.threshold_ms, 1000.0);
        assert_eq!(config.benchmark.worker_mode, WorkerMode::Task);
        assert!(config.probe.enabled);
        assert!(config.benchmark.default_targets.len() > 5);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
computer_name = "lab-7"
data_dir = "/var/lib/sitebench"

[benchmark]
max_targets = 3
worker_mode = "process"
default_targets = ["https://a.test", "https://b.test"]

[probe]
threshold_ms = 750.0
label_b = "Quad9"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.computer_name.as_deref(), Some("lab-7"));
        assert_eq!(config.general.data_dir, "/var/lib/sitebench");
        assert_eq!(config.general.wait_seconds, 120);
        assert_eq!(config.benchmark.max_targets, 3);
        assert_eq!(config.benchmark.worker_mode, WorkerMode::Process);
        assert_eq!(
            config.benchmark.default_targets,
            vec!["https://a.test", "https://b.test"]
        );
        assert_eq!(config.probe.threshold_ms, 750.0);
        assert_eq!(config.probe.label_a, "Cloudflare");
        assert_eq!(config.probe.label_b, "Quad9");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[benchmark]"));
        assert!(toml_str.contains("[probe]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.benchmark.max_targets, 5);
    }

    #[test]
    fn test_validate_limits() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.benchmark.max_targets = 0;
        assert!(config.validate().is_err());
        config.benchmark.max_targets = 6;
        assert!(config.validate().is_err());
        config.benchmark.max_targets = 1;
        assert!(config.validate().is_ok());

        config.benchmark.history_limit = 0;
        assert!(config.validate().is_err());
        config.benchmark.history_limit = 6;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history_limit"));
        config.benchmark.history_limit = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parsed_zero_max_targets_is_rejected() {
        let config: Config = toml::from_str("[benchmark]\nmax_targets = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_computer_name_wins() {
        let mut config = Config::default();
        config.general.computer_name = Some("bench-box".to_string());
        assert_eq!(config.computer_name(), "bench-box");
    }
}
