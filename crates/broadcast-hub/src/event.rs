//! Event types and id generation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of live event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Synthetic first event on every connection
    Connected,
    /// New reading for a station
    Data,
    /// Polling status change for a station
    Status,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Data => "data",
            EventKind::Status => "status",
        }
    }
}

/// Event pushed to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastEvent {
    /// Monotonic event id; 0 means "assign on publish"
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BroadcastEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: 0,
            kind,
            station_id: None,
            payload,
            timestamp: None,
        }
    }

    /// Connection greeting
    pub fn connected(client_id: &str, resumed: bool) -> Self {
        Self::new(
            EventKind::Connected,
            serde_json::json!({ "client_id": client_id, "resumed": resumed }),
        )
    }

    /// New reading for a station
    pub fn data(station_id: &str, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Data, payload).for_station(station_id)
    }

    /// Polling status for a station
    pub fn status(station_id: &str, payload: serde_json::Value) -> Self {
        Self::new(EventKind::Status, payload).for_station(station_id)
    }

    pub fn for_station(mut self, station_id: &str) -> Self {
        self.station_id = Some(station_id.to_string());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Last event id a reconnecting client has seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResumeToken(pub u64);

impl ResumeToken {
    /// Parse a token from a query parameter or `Last-Event-ID` header.
    /// Empty, zero and non-numeric values carry no position.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(Self(id)),
        }
    }

    pub fn last_event_id(&self) -> u64 {
        self.0
    }
}

/// Strictly increasing ids derived from wall-clock milliseconds.
///
/// Two ids requested within the same millisecond are bumped by one, so the
/// sequence never repeats even if the clock stalls or steps back.
#[derive(Debug, Default)]
pub struct EventIdGenerator {
    last: AtomicU64,
}

impl EventIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }

    /// Allocate the next id
    pub fn next_id(&self) -> u64 {
        let now = Self::now_ms();
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Highest id allocated or observed so far
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }

    /// Make sure future ids sort after an externally assigned one
    pub fn observe(&self, id: u64) {
        self.last.fetch_max(id, Ordering::AcqRel);
    }
}
