//! Observation Routes

use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::BTreeMap;
use storage::Reading;

use crate::error::ApiError;
use crate::AppState;

/// Latest reading per station, keyed by station id
pub async fn get_observations(State(state): State<AppState>) -> Json<BTreeMap<String, Reading>> {
    Json(state.scheduler.latest_values().into_iter().collect())
}

/// Latest readings as a list ordered by station id
pub async fn get_latest(State(state): State<AppState>) -> Json<Vec<Reading>> {
    let mut readings: Vec<Reading> = state.scheduler.latest_values().into_values().collect();
    readings.sort_by(|a, b| a.station_id.cmp(&b.station_id));
    Json(readings)
}

/// Latest reading for one station
pub async fn get_observation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Reading>, ApiError> {
    if state.registry.get(&id).is_none() {
        return Err(ApiError::NotFound(format!("station {} not found", id)));
    }

    state
        .scheduler
        .latest_value(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no data for station {}", id)))
}
