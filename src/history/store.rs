//! Bounded, persisted history of finished runs.
//!
//! History is convenience state: unreadable or missing data falls back to an
//! empty log and failed writes are logged, never raised.

use crate::history::storage::KeyValueStore;
use crate::models::RunRecord;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the serialized history log.
pub const HISTORY_KEY: &str = "history";

/// Storage key of the newline-delimited target pool.
pub const TARGETS_KEY: &str = "targets";

/// Default and upper bound on the number of runs kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// The last few finished runs, newest first.
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    records: Vec<RunRecord>,
}

impl HistoryStore {
    /// Restore the log from `store`, or start empty.
    /// `limit` is kept within `1..=DEFAULT_HISTORY_LIMIT`.
    pub fn load(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        let limit = limit.clamp(1, DEFAULT_HISTORY_LIMIT);
        let mut records = match store.get(HISTORY_KEY) {
            Ok(Some(blob)) => match serde_json::from_str::<Vec<RunRecord>>(&blob) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Ignoring malformed run history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => {
                debug!("No stored run history");
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to read run history: {}", e);
                Vec::new()
            }
        };

        records.truncate(limit);
        debug!("Loaded {} history records", records.len());

        Self {
            store,
            limit,
            records,
        }
    }

    /// Prepend `record`, evict the oldest beyond the limit, then persist.
    pub fn append(&mut self, record: RunRecord) {
        self.records.insert(0, record);
        self.records.truncate(self.limit);
        self.persist();
    }

    /// Records, newest first.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) {
        let blob = match serde_json::to_string(&self.records) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to serialize run history: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(HISTORY_KEY, &blob) {
            warn!("Failed to persist run history: {}", e);
        }
    }
}

/// Split a newline-delimited site list, skipping blank lines.
pub fn parse_target_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read the stored target pool. `None` when absent, empty or unreadable.
pub fn load_targets(store: &dyn KeyValueStore) -> Option<Vec<String>> {
    match store.get(TARGETS_KEY) {
        Ok(Some(text)) => {
            let targets = parse_target_list(&text);
            if targets.is_empty() {
                None
            } else {
                Some(targets)
            }
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read target pool: {}", e);
            None
        }
    }
}

/// Replace the stored target pool.
pub fn save_targets(store: &dyn KeyValueStore, targets: &[String]) -> Result<()> {
    store.set(TARGETS_KEY, &targets.join("\n"))
}
