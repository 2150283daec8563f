//! Observation types

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One timestamped wind measurement. Each value is independently optional;
/// an absent value is not zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    /// Mean wind speed (m/s)
    pub wind_speed: Option<f64>,
    /// Gust speed (m/s)
    pub wind_gust: Option<f64>,
    /// Direction (degrees)
    pub wind_direction: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            wind_speed: None,
            wind_gust: None,
            wind_direction: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.wind_speed = Some(speed);
        self
    }

    pub fn with_gust(mut self, gust: f64) -> Self {
        self.wind_gust = Some(gust);
        self
    }

    pub fn with_direction(mut self, direction: f64) -> Self {
        self.wind_direction = Some(direction);
        self
    }

    /// True when no measurement is present
    pub fn is_empty(&self) -> bool {
        self.wind_speed.is_none() && self.wind_gust.is_none() && self.wind_direction.is_none()
    }
}

/// Station ID -> observations sorted by timestamp
pub type BatchResult = HashMap<String, Vec<Observation>>;
