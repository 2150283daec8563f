//! Live event stream
//!
//! Each `GET /events` request registers a hub subscriber and streams its
//! queue as server-sent events. A connect observer pushes the current
//! readings and poll statuses to the new subscriber so it renders fully
//! before the next poll round; a resume token can narrow that replay.

use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use broadcast_hub::{
    BroadcastEvent, BroadcastHub, ConnectObserver, ConnectedSubscriber, Delivery, HubConfig,
    ResumeToken, SubscriberHandle,
};
use poll_scheduler::PollScheduler;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Weak};
use std::time::Duration;
use storage::Reading;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header carrying a caller-chosen subscriber id
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// Header browsers send on automatic reconnect
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// What a new subscriber is sent before live events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpStrategy {
    /// Every reading and every status
    #[default]
    Full,
    /// Readings newer than the resume token, plus every status
    ChangedSince,
}

/// Live endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub keepalive_secs: u64,
    /// Per-subscriber queue size; raised to fit a full catch-up
    pub queue_capacity: usize,
    pub catch_up: CatchUpStrategy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            queue_capacity: 100,
            catch_up: CatchUpStrategy::Full,
        }
    }
}

impl LiveConfig {
    /// Hub settings for a registry of `stations`.
    ///
    /// A full catch-up queues one greeting plus a reading and a status per
    /// station in one burst, so each queue holds at least that many.
    pub fn hub_config(&self, stations: usize) -> HubConfig {
        HubConfig {
            queue_capacity: self.queue_capacity.max(2 * stations + 1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    pub client_id: Option<String>,
    pub last_event_id: Option<String>,
}

/// Lifecycle of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// One registered live connection. Dropping it releases the subscriber.
pub struct LiveConnection {
    hub: Arc<BroadcastHub>,
    handle: SubscriberHandle,
    state: ConnectionState,
}

impl LiveConnection {
    /// Register `client_id` with the hub, greet it and start its catch-up
    pub fn open(
        hub: Arc<BroadcastHub>,
        client_id: &str,
        resume: Option<ResumeToken>,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        debug!("Live connection {} connecting (resume: {:?})", client_id, resume);
        let (handle, receiver) = hub.subscribe(client_id, resume).into_parts();
        let mut connection = Self {
            hub,
            handle,
            state: ConnectionState::Connecting,
        };

        connection.hub.send_to(
            &connection.handle,
            BroadcastEvent::connected(client_id, resume.is_some()),
        );
        connection.hub.notify_connected(&connection.handle);
        connection.state = ConnectionState::Connected;

        (connection, receiver)
    }

    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Release the subscriber. Later calls do nothing.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.hub.release(&self.handle);
        self.state = ConnectionState::Disconnected;
        debug!("Live connection {} closed", self.handle.id());
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_sse_event(delivery: &Delivery) -> Event {
    let data = match serde_json::to_string(&delivery.event) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to serialize live event {}: {}", delivery.event.id, e);
            "{}".to_string()
        }
    };

    Event::default()
        .id(delivery.wire_id.to_string())
        .event(delivery.event.kind.as_str())
        .data(data)
}

/// Turn a connection's queue into an SSE stream that owns the connection
pub fn event_stream(
    connection: LiveConnection,
    receiver: mpsc::Receiver<Delivery>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(receiver).map(move |delivery| {
        let _connection = &connection;
        Ok(to_sse_event(&delivery))
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `GET /events`
pub async fn live_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LiveQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = header_value(&headers, CLIENT_ID_HEADER)
        .map(str::to_string)
        .or_else(|| params.client_id.filter(|id| !id.trim().is_empty()))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let resume = params
        .last_event_id
        .as_deref()
        .and_then(ResumeToken::parse)
        .or_else(|| header_value(&headers, LAST_EVENT_ID_HEADER).and_then(ResumeToken::parse));

    info!("Live client {} connected (resume: {:?})", client_id, resume);
    let (connection, receiver) = LiveConnection::open(Arc::clone(&state.hub), &client_id, resume);

    Sse::new(event_stream(connection, receiver)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.live.keepalive_secs.max(1)))
            .text("keepalive"),
    )
}

/// Connect observer that replays scheduler snapshots to new subscribers
pub struct SnapshotCatchUp {
    scheduler: Weak<PollScheduler>,
    strategy: CatchUpStrategy,
}

impl SnapshotCatchUp {
    pub fn new(scheduler: &Arc<PollScheduler>, strategy: CatchUpStrategy) -> Self {
        Self {
            scheduler: Arc::downgrade(scheduler),
            strategy,
        }
    }

    fn readings_for(
        &self,
        scheduler: &PollScheduler,
        hub: &BroadcastHub,
        resume: Option<ResumeToken>,
    ) -> Vec<Reading> {
        match (self.strategy, resume) {
            (CatchUpStrategy::ChangedSince, Some(token))
                if token.last_event_id() <= hub.current_event_id() =>
            {
                scheduler.store().changed_since(token.last_event_id())
            }
            _ => {
                let mut all: Vec<Reading> = scheduler.latest_values().into_values().collect();
                all.sort_by_key(|r| r.revision);
                all
            }
        }
    }
}

impl ConnectObserver for SnapshotCatchUp {
    fn on_connect(&self, hub: &BroadcastHub, subscriber: &ConnectedSubscriber) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        let handle = &subscriber.handle;

        let readings = self.readings_for(&scheduler, hub, subscriber.resume);
        let statuses = scheduler.poll_states();
        let (reading_count, status_count) = (readings.len(), statuses.len());

        for reading in readings {
            let payload = serde_json::to_value(&reading).unwrap_or_default();
            let event = BroadcastEvent::data(&reading.station_id, payload).with_id(reading.revision);
            if !hub.send_to(handle, event) {
                debug!("Catch-up for {} stopped early", handle.id());
                return;
            }
        }

        for state in statuses {
            let payload = serde_json::to_value(state.status()).unwrap_or_default();
            if !hub.send_to(handle, BroadcastEvent::status(&state.station_id, payload)) {
                debug!("Catch-up for {} stopped early", handle.id());
                return;
            }
        }

        hub.mark_caught_up(handle);
        debug!(
            "Caught up {} with {} readings and {} statuses",
            handle.id(),
            reading_count,
            status_count
        );
    }
}

/// Register snapshot catch-up on the scheduler's hub
pub fn install_catch_up(scheduler: &Arc<PollScheduler>, strategy: CatchUpStrategy) {
    info!("Live catch-up strategy: {:?}", strategy);
    scheduler
        .hub()
        .on_connect(Arc::new(SnapshotCatchUp::new(scheduler, strategy)));
}
