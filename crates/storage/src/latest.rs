//! Latest-Value Store

use crate::persist::{load_snapshot, save_snapshot};
use crate::reading::Reading;
use crate::StorageError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Most recent reading per station.
///
/// One coarse lock guards the map; station cardinality is small and every
/// accessor copies out, so callers never hold references into the map.
#[derive(Debug, Default)]
pub struct LatestValueStore {
    readings: RwLock<HashMap<String, Reading>>,
}

impl LatestValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with readings
    pub fn from_readings(readings: HashMap<String, Reading>) -> Self {
        Self {
            readings: RwLock::new(readings),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Reading>> {
        self.readings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Reading>> {
        self.readings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the reading for a station, returning the previous one
    pub fn upsert(&self, id: &str, reading: Reading) -> Option<Reading> {
        debug!("Upserting reading for {} (revision {})", id, reading.revision);
        self.write().insert(id.to_string(), reading)
    }

    /// Copy of the reading for a station
    pub fn get(&self, id: &str) -> Option<Reading> {
        self.read().get(id).cloned()
    }

    /// Copy of every reading
    pub fn get_all(&self) -> HashMap<String, Reading> {
        self.read().clone()
    }

    /// Readings with a revision above `revision`, oldest first
    pub fn changed_since(&self, revision: u64) -> Vec<Reading> {
        let mut changed: Vec<Reading> = self
            .read()
            .values()
            .filter(|r| r.revision > revision)
            .cloned()
            .collect();
        changed.sort_by_key(|r| r.revision);
        changed
    }

    /// Highest stored revision, 0 when empty
    pub fn max_revision(&self) -> u64 {
        self.read().values().map(|r| r.revision).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Load a store from a snapshot file; a missing file gives an empty store
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let readings: HashMap<String, Reading> = load_snapshot(path)?.unwrap_or_default();
        info!("Loaded latest readings for {} stations", readings.len());
        Ok(Self::from_readings(readings))
    }

    /// Persist the current contents. The lock is released before any file I/O.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let snapshot: BTreeMap<String, Reading> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        save_snapshot(path, &snapshot)
    }
}
