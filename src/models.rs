//! Data models for the benchmark coordinator.
//!
//! This module contains the core data structures shared by the coordinator,
//! the aggregator, the history store and the workers: runs, measurements,
//! finished run records and the wire format of worker messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a run within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, workers not yet spawned
    Pending,
    /// Workers spawned, waiting for results
    Active,
    /// Every expected result has arrived
    Complete,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Active => write!(f, "Active"),
            RunStatus::Complete => write!(f, "Complete"),
        }
    }
}

/// One benchmark execution across several selected targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub computer_name: String,
    /// Number of results needed for completion (the sample size).
    pub expected_count: usize,
    /// Sampled targets; position is the worker ordinal.
    pub selected_targets: Vec<String>,
    pub status: RunStatus,
}

/// One target's reported performance numbers for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub run_id: RunId,
    /// 0-based ordinal, unique within the run.
    pub index: usize,
    pub site: String,
    /// Full page load time in milliseconds.
    pub load_time: f64,
    /// Processing time in milliseconds.
    pub cpu_time: f64,
    /// Time to first response in milliseconds.
    pub network_latency: f64,
    /// Memory footprint in megabytes.
    pub memory_usage: f64,
}

/// A measurement together with its derived score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMeasurement {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub score: u32,
}

/// A finished run. Created once on completion and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    pub at: DateTime<Utc>,
    pub computer: String,
    pub final_score: u32,
    /// Sorted by `index`.
    pub measurements: Vec<Measurement>,
}

impl RunRecord {
    /// Measurements paired with their individual scores, in index order.
    pub fn scored(&self) -> Vec<ScoredMeasurement> {
        self.measurements
            .iter()
            .map(|m| ScoredMeasurement {
                measurement: m.clone(),
                score: crate::analysis::score(m),
            })
            .collect()
    }

    /// Slowest page load in this run, if any.
    pub fn max_load_time(&self) -> Option<f64> {
        self.measurements
            .iter()
            .map(|m| m.load_time)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))))
    }
}

/// Inbound worker message, decoded from its JSON wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "benchmarkResult")]
    BenchmarkResult(Measurement),
    /// Any other tag; always ignored.
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    /// Decode a single wire line. Anything that is not a JSON object with a
    /// `type` tag yields `None`.
    pub fn decode(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Encode to the single-line wire form.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Instruction to create one worker for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub site: String,
    pub run_id: RunId,
    pub index: usize,
}

impl SpawnRequest {
    /// Command-line arguments addressing a worker process.
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            "--worker-site".to_string(),
            self.site.clone(),
            "--worker-run-id".to_string(),
            self.run_id.to_string(),
            "--worker-index".to_string(),
            self.index.to_string(),
        ]
    }
}

impl fmt::Display for SpawnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "site={}&runId={}&index={}",
            self.site, self.run_id, self.index
        )
    }
}

/// Which probe endpoint is recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolver {
    A,
    B,
}

/// Outcome of the diagnostic latency probe. Recomputed per run, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub latency_a: f64,
    pub latency_b: f64,
    pub recommended: Resolver,
}

impl ProbeResult {
    /// Build a result, recommending whichever endpoint answered faster.
    pub fn from_latencies(latency_a: f64, latency_b: f64) -> Self {
        let recommended = if latency_b < latency_a {
            Resolver::B
        } else {
            Resolver::A
        };
        Self {
            latency_a,
            latency_b,
            recommended,
        }
    }
}
