//! Registry Implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// A monitored weather station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Upstream station identifier (FMISID)
    pub id: String,
    /// Display name
    pub name: String,
    /// Region used for grouping in the UI
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    /// Create a new station entry
    pub fn new(id: &str, name: &str, region: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            region: region.to_string(),
            latitude,
            longitude,
        }
    }
}

/// Immutable station registry
#[derive(Debug, Clone)]
pub struct StationRegistry {
    /// Stations in configuration order
    stations: Vec<Station>,
    /// Station ID -> index into `stations`
    by_id: HashMap<String, usize>,
}

impl StationRegistry {
    /// Build a registry from a station list. Later duplicates of an ID are ignored.
    pub fn new(stations: Vec<Station>) -> Self {
        let mut unique = Vec::with_capacity(stations.len());
        let mut by_id = HashMap::with_capacity(stations.len());

        for station in stations {
            if by_id.contains_key(&station.id) {
                warn!("Ignoring duplicate station {}", station.id);
                continue;
            }
            by_id.insert(station.id.clone(), unique.len());
            unique.push(station);
        }

        info!("Station registry loaded with {} stations", unique.len());
        Self {
            stations: unique,
            by_id,
        }
    }

    /// Registry with the built-in station list
    pub fn with_defaults() -> Self {
        Self::new(crate::default_stations())
    }

    /// All stations in configuration order
    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    /// Look up a station by ID
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.by_id.get(id).map(|&idx| &self.stations[idx])
    }

    /// Stations in a region
    pub fn by_region(&self, region: &str) -> Vec<Station> {
        self.stations
            .iter()
            .filter(|s| s.region == region)
            .cloned()
            .collect()
    }

    /// All station IDs in configuration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl Default for StationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
