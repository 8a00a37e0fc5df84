//! Run coordination.
//!
//! The coordinator owns every piece of mutable session state: the active run,
//! the result aggregator and the history log. Workers only ever talk to it
//! through the message channel, tagged with `(run id, index)`.

pub mod channel;

use crate::analysis::ResultAggregator;
use crate::error::ValidationError;
use crate::history::HistoryStore;
use crate::models::{Run, RunId, RunRecord, RunStatus, SpawnRequest, WorkerMessage};
use crate::probe::should_probe;
use crate::worker::WorkerSpawner;
use channel::MessageSender;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub use channel::MessageChannel;

/// Default and upper bound on the number of targets sampled per run.
pub const DEFAULT_MAX_TARGETS: usize = 5;

/// Default load time above which the diagnostic probe runs.
pub const DEFAULT_PROBE_THRESHOLD_MS: f64 = 1000.0;

/// Millisecond-timestamp run ids that never repeat within a session.
#[derive(Debug, Default)]
pub struct RunIdGenerator {
    last: u64,
}

impl RunIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id based on the current wall clock.
    pub fn next_id(&mut self) -> RunId {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.next_at(now_ms)
    }

    /// Next id for a given clock reading; bumps past the previous id when
    /// the clock has not advanced.
    pub fn next_at(&mut self, now_ms: u64) -> RunId {
        let id = now_ms.max(self.last + 1);
        self.last = id;
        RunId(id)
    }
}

/// Tunables for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Upper bound on targets sampled per run, kept within `1..=5`.
    pub max_targets: usize,
    /// Strict lower bound on load time that triggers the probe.
    pub probe_threshold_ms: f64,
    /// Fixed sampling seed; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_targets: DEFAULT_MAX_TARGETS,
            probe_threshold_ms: DEFAULT_PROBE_THRESHOLD_MS,
            seed: None,
        }
    }
}

/// A run that just reached completion.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub record: RunRecord,
    /// Whether the diagnostic probe should run for this record.
    pub probe_due: bool,
}

/// Owns the lifecycle of the active run.
pub struct RunCoordinator {
    spawner: Box<dyn WorkerSpawner>,
    sender: MessageSender,
    settings: CoordinatorSettings,
    rng: StdRng,
    ids: RunIdGenerator,
    active: Option<Run>,
    aggregator: ResultAggregator,
    history: HistoryStore,
}

impl RunCoordinator {
    pub fn new(
        spawner: Box<dyn WorkerSpawner>,
        sender: MessageSender,
        history: HistoryStore,
        settings: CoordinatorSettings,
    ) -> Self {
        let mut settings = settings;
        let max_targets = settings.max_targets.clamp(1, DEFAULT_MAX_TARGETS);
        if max_targets != settings.max_targets {
            warn!(
                "max_targets {} out of range, using {}",
                settings.max_targets, max_targets
            );
            settings.max_targets = max_targets;
        }

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            spawner,
            sender,
            settings,
            rng,
            ids: RunIdGenerator::new(),
            active: None,
            aggregator: ResultAggregator::new(),
            history,
        }
    }

    /// Start a new run, superseding any run still in flight.
    ///
    /// Samples up to `max_targets` distinct targets from `target_pool` and
    /// spawns one worker per target. Nothing is allocated or spawned when
    /// validation fails.
    pub fn start_run(
        &mut self,
        target_pool: &[String],
        computer_name: &str,
    ) -> Result<RunId, ValidationError> {
        let computer_name = computer_name.trim();
        if computer_name.is_empty() {
            return Err(ValidationError::MissingComputerName);
        }

        let mut seen = HashSet::new();
        let candidates: Vec<&String> = target_pool
            .iter()
            .filter(|t| !t.trim().is_empty() && seen.insert(t.as_str()))
            .collect();
        if candidates.is_empty() {
            return Err(ValidationError::EmptyTargetPool);
        }

        let sample_size = candidates.len().min(self.settings.max_targets);
        let selected: Vec<String> = candidates
            .choose_multiple(&mut self.rng, sample_size)
            .map(|t| t.to_string())
            .collect();

        if let Some(prev) = &self.active {
            if prev.status != RunStatus::Complete {
                info!("Run {} superseded before completion", prev.id);
            }
        }

        let mut run = Run {
            id: self.ids.next_id(),
            computer_name: computer_name.to_string(),
            expected_count: selected.len(),
            selected_targets: selected,
            status: RunStatus::Pending,
        };

        // Accept results for the new id before any worker can report.
        self.aggregator.activate(&run);

        info!(
            "Starting run {} on {} with {} targets",
            run.id, run.computer_name, run.expected_count
        );

        for (index, site) in run.selected_targets.iter().enumerate() {
            self.spawner.spawn(
                SpawnRequest {
                    site: site.clone(),
                    run_id: run.id,
                    index,
                },
                self.sender.clone(),
            );
        }

        run.status = RunStatus::Active;
        let id = run.id;
        self.active = Some(run);

        Ok(id)
    }

    /// Feed one inbound worker message.
    ///
    /// Returns the completed run when this message was the last one needed.
    /// The record has already been appended to history.
    pub fn handle_message(&mut self, msg: WorkerMessage) -> Option<CompletedRun> {
        let record = self.aggregator.on_message(msg)?;

        if let Some(run) = self.active.as_mut() {
            if run.id == record.id {
                run.status = RunStatus::Complete;
            }
        }

        let probe_due = should_probe(&record, self.settings.probe_threshold_ms);
        info!(
            "Run {} complete: score {} across {} targets",
            record.id,
            record.final_score,
            record.measurements.len()
        );

        self.history.append(record.clone());

        Some(CompletedRun { record, probe_due })
    }

    /// Pump messages from `rx` until the active run completes.
    ///
    /// `progress` is called with `(received, expected)` after every message.
    /// Returns `None` if the channel closes first.
    pub async fn wait_for_completion<F>(
        &mut self,
        rx: &mut UnboundedReceiver<WorkerMessage>,
        mut progress: F,
    ) -> Option<CompletedRun>
    where
        F: FnMut(usize, usize),
    {
        while let Some(msg) = rx.recv().await {
            if let Some(done) = self.handle_message(msg) {
                progress(self.aggregator.expected(), self.aggregator.expected());
                return Some(done);
            }
            progress(self.aggregator.received(), self.aggregator.expected());
        }

        debug!(
            "Message channel closed before run {:?} completed",
            self.aggregator.active_run_id()
        );
        None
    }

    /// The most recently started run.
    pub fn active_run(&self) -> Option<&Run> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}
