//! Reading record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest wind reading for a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub region: String,
    /// Observation time reported upstream
    #[serde(alias = "timestamp")]
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_gust: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<f64>,
    /// When this process stored the reading
    pub updated_at: DateTime<Utc>,
    /// Event id under which the reading was published
    #[serde(default)]
    pub revision: u64,
}
