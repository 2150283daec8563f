//! Windwatch API Server
//!
//! Serves the live event stream, REST read endpoints over the scheduler's
//! stores, health and metrics. [`run_server`] wires every component together.

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use broadcast_hub::BroadcastHub;
use fmi_client::FmiClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use poll_scheduler::PollScheduler;
use serde::Serialize;
use station_registry::StationRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
pub mod live;
pub mod rate_limit;
mod routes;

pub use config::{AppConfig, LoggingConfig};
pub use error::ApiError;
pub use live::{CatchUpStrategy, LiveConfig};
pub use rate_limit::RateLimitConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StationRegistry>,
    pub scheduler: Arc<PollScheduler>,
    pub hub: Arc<BroadcastHub>,
    pub live: LiveConfig,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Set when the Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(scheduler: Arc<PollScheduler>, live: LiveConfig) -> Self {
        Self {
            registry: Arc::clone(scheduler.registry()),
            hub: Arc::clone(scheduler.hub()),
            scheduler,
            live,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub stations: usize,
    pub readings: usize,
    pub live_connections: usize,
}

/// Create the application router.
///
/// `limits` applies to `/api/*` only and needs peer addresses, see
/// [`rate_limit::create_governor_config`].
pub fn create_router(state: AppState, limits: Option<&RateLimitConfig>) -> Router {
    let mut api = Router::new()
        .route("/api/stations", get(routes::stations::list_stations))
        .route("/api/stations/:id", get(routes::stations::get_station))
        .route(
            "/api/observations",
            get(routes::observations::get_observations),
        )
        .route(
            "/api/observations/latest",
            get(routes::observations::get_latest),
        )
        .route(
            "/api/observations/:id",
            get(routes::observations::get_observation),
        )
        .route("/api/status", get(routes::status::get_status))
        .route("/api/metrics", get(routes::status::get_metrics));

    if let Some(config) = limits.and_then(rate_limit::create_governor_config) {
        api = api.layer(GovernorLayer { config });
    }

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(prometheus_handler))
        .route(
            "/events",
            // Reverse proxies must not buffer the stream
            get(live::live_events).layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            )),
        )
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        stations: state.registry.len(),
        readings: state.scheduler.store().len(),
        live_connections: state.hub.subscriber_count(),
    })
}

/// Prometheus text exposition
async fn prometheus_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .prometheus
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("metrics recorder not installed".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    }
}

/// Run the scheduler and the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let prometheus = install_prometheus();

    let registry = Arc::new(match config.stations.clone() {
        Some(stations) => StationRegistry::new(stations),
        None => StationRegistry::with_defaults(),
    });
    let client = Arc::new(FmiClient::new(config.fmi.clone())?);
    let hub = Arc::new(BroadcastHub::new(config.live.hub_config(registry.len())));

    let scheduler = Arc::new(
        PollScheduler::new(config.scheduler.clone(), registry, client, Arc::clone(&hub))
            .restore_from(config.storage.state_files()),
    );
    live::install_catch_up(&scheduler, config.live.catch_up);

    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(shutdown.clone()));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let mut state = AppState::new(Arc::clone(&scheduler), config.live.clone());
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }
    let app = create_router(state, Some(&config.rate_limit));

    info!("Starting API server on {}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        let hub = Arc::clone(&hub);
        async move {
            shutdown.cancelled().await;
            // Open event streams end when their queues close
            hub.close_all();
        }
    })
    .await?;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }

    info!("Windwatch stopped");
    Ok(())
}
