//! Run history and durable keyed storage.

pub mod storage;
pub mod store;

pub use storage::{FileStore, KeyValueStore};
pub use store::{load_targets, save_targets, HistoryStore};
