//! Polling Status Routes

use axum::{extract::State, Json};
use poll_scheduler::{PollTier, StationStatus};
use serde::Serialize;
use station_registry::Station;
use std::collections::BTreeMap;
use storage::Reading;

use crate::AppState;

/// Status row for one station
#[derive(Debug, Serialize)]
pub struct StationOverview {
    #[serde(flatten)]
    pub station: Station,
    /// Absent until the first scheduling pass
    pub polling: Option<StationStatus>,
    /// Interval actually in effect, which is the idle tier while nobody watches
    pub effective_interval_secs: Option<i64>,
    pub latest: Option<Reading>,
}

/// Polling summary
#[derive(Debug, Serialize)]
pub struct PollingMetrics {
    pub stations: usize,
    pub tiers: BTreeMap<PollTier, usize>,
    pub total_polls: u64,
    pub successful_polls: u64,
    pub success_rate: f64,
    pub readings: usize,
    pub live_connections: usize,
    pub dropped_events: u64,
    pub uptime_seconds: u64,
}

/// Per-station metadata, polling status and latest reading
pub async fn get_status(State(state): State<AppState>) -> Json<Vec<StationOverview>> {
    let mut readings = state.scheduler.latest_values();

    let rows = state
        .registry
        .all()
        .iter()
        .map(|station| {
            let polling = state.scheduler.poll_state(&station.id);
            StationOverview {
                station: station.clone(),
                effective_interval_secs: polling
                    .as_ref()
                    .map(|p| state.scheduler.effective_interval(p.tier).num_seconds()),
                polling: polling.map(|p| p.status()),
                latest: readings.remove(&station.id),
            }
        })
        .collect();

    Json(rows)
}

/// JSON polling summary
pub async fn get_metrics(State(state): State<AppState>) -> Json<PollingMetrics> {
    let states = state.scheduler.poll_states();

    let mut tiers: BTreeMap<PollTier, usize> =
        PollTier::ALL.iter().map(|tier| (*tier, 0)).collect();
    for s in &states {
        *tiers.entry(s.tier).or_default() += 1;
    }

    let total_polls: u64 = states.iter().map(|s| s.total_polls).sum();
    let successful_polls: u64 = states.iter().map(|s| s.successful_polls).sum();
    let success_rate = if total_polls == 0 {
        0.0
    } else {
        successful_polls as f64 / total_polls as f64
    };

    Json(PollingMetrics {
        stations: state.registry.len(),
        tiers,
        total_polls,
        successful_polls,
        success_rate,
        readings: state.scheduler.store().len(),
        live_connections: state.hub.subscriber_count(),
        dropped_events: state.hub.dropped_total(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
