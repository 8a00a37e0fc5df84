//! Result aggregation for the active run.
//!
//! Workers post their results asynchronously, in any order, possibly more than
//! once, and possibly after their run has been superseded. The aggregator
//! accepts only the first result per ordinal of the active run and produces a
//! [`RunRecord`] exactly once, when the last expected ordinal arrives.

use crate::analysis::average_score;
use crate::models::{Measurement, Run, RunId, RunRecord, WorkerMessage};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Accumulator for a single run.
#[derive(Debug)]
struct Accumulator {
    run_id: RunId,
    computer: String,
    expected: usize,
    /// Keyed by ordinal so iteration is already index-sorted.
    received: BTreeMap<usize, Measurement>,
}

/// Collects worker results for whichever run is currently active.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    current: Option<Accumulator>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run` the active run, discarding anything accumulated for the
    /// previous one.
    pub fn activate(&mut self, run: &Run) {
        if let Some(prev) = &self.current {
            if prev.received.len() < prev.expected {
                debug!(
                    "Run {} superseded with {}/{} results",
                    prev.run_id,
                    prev.received.len(),
                    prev.expected
                );
            }
        }

        self.current = Some(Accumulator {
            run_id: run.id,
            computer: run.computer_name.clone(),
            expected: run.expected_count,
            received: BTreeMap::new(),
        });
    }

    /// Id of the run results are currently accepted for.
    pub fn active_run_id(&self) -> Option<RunId> {
        self.current.as_ref().map(|acc| acc.run_id)
    }

    /// Number of distinct results accepted for the active run.
    pub fn received(&self) -> usize {
        self.current.as_ref().map_or(0, |acc| acc.received.len())
    }

    /// Number of results the active run needs.
    pub fn expected(&self) -> usize {
        self.current.as_ref().map_or(0, |acc| acc.expected)
    }

    /// Feed one inbound message.
    ///
    /// Returns the finished record when this message completes the active run.
    /// Wrong tags, stale run ids, out-of-range ordinals and duplicates are
    /// dropped without changing any state.
    pub fn on_message(&mut self, msg: WorkerMessage) -> Option<RunRecord> {
        let measurement = match msg {
            WorkerMessage::BenchmarkResult(m) => m,
            WorkerMessage::Unknown => {
                debug!("Dropping message with unexpected type");
                return None;
            }
        };

        let acc = match self.current.as_mut() {
            Some(acc) if acc.run_id == measurement.run_id => acc,
            _ => {
                debug!(
                    "Dropping stale result for run {} (index {})",
                    measurement.run_id, measurement.index
                );
                return None;
            }
        };

        if measurement.index >= acc.expected {
            debug!(
                "Dropping result with out-of-range index {} for run {}",
                measurement.index, acc.run_id
            );
            return None;
        }

        if acc.received.contains_key(&measurement.index) {
            debug!(
                "Dropping duplicate result for run {} (index {})",
                acc.run_id, measurement.index
            );
            return None;
        }

        debug!(
            "Accepted result {}/{} for run {}: {}",
            acc.received.len() + 1,
            acc.expected,
            acc.run_id,
            measurement.site
        );
        acc.received.insert(measurement.index, measurement);

        // The count only grows and is bounded by `expected`, so this fires once.
        if acc.received.len() != acc.expected {
            return None;
        }

        let measurements: Vec<Measurement> = acc.received.values().cloned().collect();
        Some(RunRecord {
            id: acc.run_id,
            at: Utc::now(),
            computer: acc.computer.clone(),
            final_score: average_score(&measurements),
            measurements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;

    fn make_run(id: u64, expected: usize) -> Run {
        Run {
            id: RunId(id),
            computer_name: "bench-host".to_string(),
            expected_count: expected,
            selected_targets: (0..expected).map(|i| format!("https://s{}.test", i)).collect(),
            status: RunStatus::Active,
        }
    }

    fn result(run: u64, index: usize) -> WorkerMessage {
        WorkerMessage::BenchmarkResult(Measurement {
            run_id: RunId(run),
            index,
            site: format!("https://s{}.test", index),
            load_time: 100.0 * (index as f64 + 1.0),
            cpu_time: 10.0,
            network_latency: 5.0,
            memory_usage: 1.0,
        })
    }

    /// Every permutation of `0..n` (Heap's algorithm).
    fn permutations(n: usize) -> Vec<Vec<usize>> {
        fn heap(k: usize, items: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            for i in 0..k - 1 {
                heap(k - 1, items, out);
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
            }
            heap(k - 1, items, out);
        }

        let mut items: Vec<usize> = (0..n).collect();
        let mut out = Vec::new();
        heap(n, &mut items, &mut out);
        out
    }

    #[test]
    fn test_completes_once_for_every_order_with_duplicates() {
        let n = 4;
        let orders = permutations(n);
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut agg = ResultAggregator::new();
            agg.activate(&make_run(1, n));

            // Deliver each ordinal twice, the duplicate interleaved later.
            let mut deliveries = order.clone();
            deliveries.extend(order.iter().rev());

            let mut completions = 0;
            for index in deliveries {
                if let Some(record) = agg.on_message(result(1, index)) {
                    completions += 1;
                    assert_eq!(record.measurements.len(), n);
                }
            }

            assert_eq!(completions, 1, "order {:?}", order);
            assert_eq!(agg.received(), n);
        }
    }

    #[test]
    fn test_record_is_sorted_and_scored() {
        let mut agg = ResultAggregator::new();
        agg.activate(&make_run(5, 3));

        assert!(agg.on_message(result(5, 2)).is_none());
        assert!(agg.on_message(result(5, 0)).is_none());
        let record = agg.on_message(result(5, 1)).unwrap();

        let indices: Vec<usize> = record.measurements.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(record.id, RunId(5));
        assert_eq!(record.computer, "bench-host");
        assert_eq!(record.final_score, average_score(&record.measurements));
    }

    #[test]
    fn test_stale_run_results_are_ignored() {
        let mut agg = ResultAggregator::new();
        agg.activate(&make_run(1, 2));
        assert!(agg.on_message(result(1, 0)).is_none());

        agg.activate(&make_run(2, 2));
        assert_eq!(agg.received(), 0);

        // Late delivery from the superseded run.
        assert!(agg.on_message(result(1, 1)).is_none());
        assert!(agg.on_message(result(1, 0)).is_none());
        assert_eq!(agg.received(), 0);

        assert!(agg.on_message(result(2, 0)).is_none());
        assert!(agg.on_message(result(2, 1)).is_some());
    }

    #[test]
    fn test_unknown_messages_are_ignored() {
        let mut agg = ResultAggregator::new();
        agg.activate(&make_run(1, 1));

        assert!(agg.on_message(WorkerMessage::Unknown).is_none());
        assert_eq!(agg.received(), 0);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut agg = ResultAggregator::new();
        agg.activate(&make_run(1, 2));

        assert!(agg.on_message(result(1, 2)).is_none());
        assert!(agg.on_message(result(1, 7)).is_none());
        assert_eq!(agg.received(), 0);
    }

    #[test]
    fn test_no_active_run_drops_everything() {
        let mut agg = ResultAggregator::new();
        assert!(agg.on_message(result(1, 0)).is_none());
        assert_eq!(agg.active_run_id(), None);
        assert_eq!(agg.expected(), 0);
    }

    #[test]
    fn test_nothing_after_completion() {
        let mut agg = ResultAggregator::new();
        agg.activate(&make_run(3, 1));

        assert!(agg.on_message(result(3, 0)).is_some());
        assert!(agg.on_message(result(3, 0)).is_none());
        assert_eq!(agg.received(), 1);
    }
}
