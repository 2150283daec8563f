//! Storage Layer
//!
//! Holds the most recent reading per station and persists snapshots of
//! keyed state as JSON files so a restart renders immediately.

mod latest;
mod persist;
mod reading;

pub use latest::LatestValueStore;
pub use persist::{load_snapshot, save_snapshot};
pub use reading::Reading;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Serialization error in {path}: {message}")]
    Serialization { path: String, message: String },
}
