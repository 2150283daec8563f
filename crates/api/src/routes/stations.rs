//! Station Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use station_registry::Station;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the station list
#[derive(Debug, Deserialize)]
pub struct StationQuery {
    /// Only stations in this region
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StationList {
    pub stations: Vec<Station>,
    pub count: usize,
}

/// List stations, optionally filtered by region
pub async fn list_stations(
    State(state): State<AppState>,
    Query(params): Query<StationQuery>,
) -> Json<StationList> {
    let stations = match params.region.as_deref() {
        Some(region) => state.registry.by_region(region),
        None => state.registry.all().to_vec(),
    };

    Json(StationList {
        count: stations.len(),
        stations,
    })
}

/// Get one station
pub async fn get_station(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Station>, ApiError> {
    state
        .registry
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("station {} not found", id)))
}
