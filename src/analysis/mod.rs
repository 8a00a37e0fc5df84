//! Scoring and result aggregation.
//!
//! Scores are derived from the four raw measurement values; the aggregator
//! collects worker results for the active run and detects completion.

pub mod aggregator;
pub mod score;

pub use aggregator::ResultAggregator;
pub use score::{average_score, score};
