//! Poll Scheduler Implementation

use crate::batch::plan_batches;
use crate::state::{PollOutcome, PollState};
use crate::tier::{PollTier, TierPolicy};
use broadcast_hub::{BroadcastEvent, BroadcastHub};
use chrono::{DateTime, Duration, Utc};
use fmi_client::{FetchClient, Observation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use station_registry::StationRegistry;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use storage::{load_snapshot, save_snapshot, LatestValueStore, Reading, StorageError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the poll scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due checks
    pub tick_secs: u64,
    /// Stations per upstream call, capped at the upstream limit
    pub max_batch_size: usize,
    /// Default lookback window in seconds
    pub window_secs: i64,
    /// Tier every station is held at while nobody is watching
    pub idle_tier: PollTier,
    /// Save state every N rounds; 0 disables opportunistic saves
    pub save_every_rounds: u64,
    pub tiers: TierPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            max_batch_size: fmi_client::MAX_BATCH_SIZE,
            window_secs: 2 * 60 * 60,
            idle_tier: PollTier::UltraSlow,
            save_every_rounds: 10,
            tiers: TierPolicy::default(),
        }
    }
}

/// Where poll states and latest readings are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFiles {
    pub poll_states: PathBuf,
    pub readings: PathBuf,
}

/// Summary of one polling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub due: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub updated: usize,
    pub misses: usize,
    pub tier_changes: usize,
    pub events: usize,
}

/// Adaptive poll scheduler.
///
/// Owns the poll-state map and the latest-value store. Every accessor
/// returns copies.
pub struct PollScheduler {
    config: SchedulerConfig,
    registry: Arc<StationRegistry>,
    client: Arc<dyn FetchClient>,
    hub: Arc<BroadcastHub>,
    states: Mutex<HashMap<String, PollState>>,
    store: LatestValueStore,
    files: Option<StateFiles>,
    rounds: AtomicU64,
}

impl PollScheduler {
    /// Create a new scheduler with empty state
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<StationRegistry>,
        client: Arc<dyn FetchClient>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        info!(
            "Poll scheduler created for {} stations (tick {}s, batch size {})",
            registry.len(),
            config.tick_secs,
            config.max_batch_size
        );

        Self {
            config,
            registry,
            client,
            hub,
            states: Mutex::new(HashMap::new()),
            store: LatestValueStore::new(),
            files: None,
            rounds: AtomicU64::new(0),
        }
    }

    /// Seed poll states. States for unknown stations are ignored.
    pub fn with_states(self, states: impl IntoIterator<Item = PollState>) -> Self {
        {
            let mut map = self.lock_states();
            for state in states {
                if self.registry.get(&state.station_id).is_some() {
                    map.insert(state.station_id.clone(), state);
                }
            }
        }
        self
    }

    /// Seed latest readings
    pub fn with_readings(self, readings: impl IntoIterator<Item = Reading>) -> Self {
        for reading in readings {
            let id = reading.station_id.clone();
            self.store.upsert(&id, reading);
        }
        self.hub.observe_event_id(self.store.max_revision());
        self
    }

    /// Load persisted state from `files` and save back to them later.
    ///
    /// Missing or unreadable files leave the scheduler empty.
    pub fn restore_from(mut self, files: StateFiles) -> Self {
        let states: Vec<PollState> =
            match load_snapshot::<HashMap<String, PollState>>(&files.poll_states) {
                Ok(loaded) => loaded.unwrap_or_default().into_values().collect(),
                Err(e) => {
                    warn!("Ignoring poll state file: {}", e);
                    Vec::new()
                }
            };
        info!("Restored poll state for {} stations", states.len());

        let readings: Vec<Reading> = match LatestValueStore::load(&files.readings) {
            Ok(store) => store.get_all().into_values().collect(),
            Err(e) => {
                warn!("Ignoring readings file: {}", e);
                Vec::new()
            }
        };

        self.files = Some(files);
        self.with_states(states).with_readings(readings)
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, PollState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interval_for(&self, tier: PollTier, idle: bool) -> Duration {
        if idle {
            self.config.idle_tier.interval()
        } else {
            tier.interval()
        }
    }

    /// Interval a station at `tier` is currently polled at
    pub fn effective_interval(&self, tier: PollTier) -> Duration {
        self.interval_for(tier, !self.hub.has_subscribers())
    }

    fn reading_for(
        &self,
        station_id: &str,
        observation: Observation,
        now: DateTime<Utc>,
        revision: u64,
    ) -> Reading {
        let (station_name, region) = self
            .registry
            .get(station_id)
            .map(|s| (s.name.clone(), s.region.clone()))
            .unwrap_or_default();

        Reading {
            station_id: station_id.to_string(),
            station_name,
            region,
            observed_at: observation.timestamp,
            wind_speed: observation.wind_speed,
            wind_gust: observation.wind_gust,
            wind_direction: observation.wind_direction,
            updated_at: now,
            revision,
        }
    }

    /// Run one polling round at `now`.
    ///
    /// State is copied out under the lock, fetched without any lock held,
    /// then written back by station id.
    pub async fn poll_round(&self, now: DateTime<Utc>) -> RoundReport {
        let idle = !self.hub.has_subscribers();

        let due: Vec<PollState> = {
            let mut states = self.lock_states();
            for station in self.registry.all() {
                states
                    .entry(station.id.clone())
                    .or_insert_with(|| PollState::new(&station.id));
            }
            let mut due: Vec<PollState> = states
                .values()
                .filter(|s| s.is_due(now, self.interval_for(s.tier, idle)))
                .cloned()
                .collect();
            due.sort_by(|a, b| a.station_id.cmp(&b.station_id));
            due
        };

        let mut report = RoundReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("No stations due");
            return report;
        }

        let batches = plan_batches(
            &due,
            now,
            Duration::seconds(self.config.window_secs),
            self.config.max_batch_size,
        );
        report.batches = batches.len();
        debug!(
            "Polling {} stations in {} batches (idle: {})",
            report.due, report.batches, idle
        );

        let previous: HashMap<String, PollTier> = due
            .iter()
            .map(|s| (s.station_id.clone(), s.tier))
            .collect();
        let mut working: BTreeMap<String, PollState> = due
            .into_iter()
            .map(|s| (s.station_id.clone(), s))
            .collect();
        let mut fresh: HashMap<String, Observation> = HashMap::new();
        let policy = &self.config.tiers;

        for batch in &batches {
            counter!("windwatch_fetch_batches_total").increment(1);

            match self
                .client
                .fetch_batch(&batch.station_ids, batch.start, batch.end)
                .await
            {
                Ok(mut series) => {
                    for id in &batch.station_ids {
                        let Some(state) = working.get_mut(id) else {
                            continue;
                        };
                        let seen = state.last_observation;
                        let observations: Vec<Observation> = series
                            .remove(id)
                            .unwrap_or_default()
                            .into_iter()
                            .filter(|o| seen.map_or(true, |last| o.timestamp > last))
                            .collect();
                        let timestamps: Vec<DateTime<Utc>> =
                            observations.iter().map(|o| o.timestamp).collect();

                        match state.record_observations(now, &timestamps, policy) {
                            PollOutcome::NewData { observations: n } => {
                                debug!("Station {}: {} new observations", id, n);
                                if let Some(newest) =
                                    observations.into_iter().max_by_key(|o| o.timestamp)
                                {
                                    fresh.insert(id.clone(), newest);
                                }
                            }
                            PollOutcome::Miss { .. } => {
                                report.misses += 1;
                                counter!("windwatch_poll_misses_total").increment(1);
                            }
                        }
                    }
                }
                Err(e) => {
                    report.failed_batches += 1;
                    counter!("windwatch_fetch_errors_total").increment(1);
                    warn!(
                        "Fetch for {} stations failed: {}",
                        batch.station_ids.len(),
                        e
                    );
                    for id in &batch.station_ids {
                        if let Some(state) = working.get_mut(id) {
                            state.record_miss(now, policy);
                            report.misses += 1;
                            counter!("windwatch_poll_misses_total").increment(1);
                        }
                    }
                }
            }
        }

        let mut events = Vec::new();
        let mut readings = Vec::new();
        {
            let mut states = self.lock_states();
            for (id, state) in working {
                let before = previous.get(&id).copied().unwrap_or(state.tier);
                if state.tier != before {
                    report.tier_changes += 1;
                    counter!("windwatch_tier_changes_total").increment(1);
                    info!("Station {}: tier {:?} -> {:?}", id, before, state.tier);

                    let payload = serde_json::to_value(state.status()).unwrap_or_default();
                    events.push(
                        BroadcastEvent::status(&id, payload).with_id(self.hub.next_event_id()),
                    );
                }

                if let Some(observation) = fresh.remove(&id) {
                    let revision = self.hub.next_event_id();
                    let reading = self.reading_for(&id, observation, now, revision);
                    let payload = serde_json::to_value(&reading).unwrap_or_default();
                    events.push(BroadcastEvent::data(&id, payload).with_id(revision));
                    readings.push(reading);
                }

                states.insert(id, state);
            }
        }

        report.updated = readings.len();
        for reading in readings {
            let id = reading.station_id.clone();
            self.store.upsert(&id, reading);
        }

        for event in events {
            self.hub.publish(event);
            report.events += 1;
        }

        info!(
            "Poll round: {} due, {} batches ({} failed), {} updated, {} tier changes",
            report.due, report.batches, report.failed_batches, report.updated, report.tier_changes
        );
        report
    }

    /// Run the scheduler loop until `shutdown` fires.
    ///
    /// The first round starts immediately. A round in progress always
    /// completes before the loop exits.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting poll scheduler");

        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.tick_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_round(Utc::now()).await;
                    self.after_round();
                }
            }
        }

        if let Err(e) = self.save_state() {
            warn!("Failed to save scheduler state: {}", e);
        }
        info!("Poll scheduler stopped");
    }

    fn after_round(&self) {
        let rounds = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.config.save_every_rounds;
        if every > 0 && rounds % every == 0 {
            if let Err(e) = self.save_state() {
                warn!("Failed to save scheduler state: {}", e);
            }
        }
    }

    /// Persist poll states and readings. No-op without state files.
    pub fn save_state(&self) -> Result<(), StorageError> {
        let Some(files) = &self.files else {
            return Ok(());
        };

        let snapshot: BTreeMap<String, PollState> = self
            .lock_states()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        save_snapshot(&files.poll_states, &snapshot)?;
        self.store.save(&files.readings)?;

        debug!("Saved state for {} stations", snapshot.len());
        Ok(())
    }

    /// Copy of one station's poll state
    pub fn poll_state(&self, station_id: &str) -> Option<PollState> {
        self.lock_states().get(station_id).cloned()
    }

    /// Copies of all poll states, ordered by station id
    pub fn poll_states(&self) -> Vec<PollState> {
        let mut states: Vec<PollState> = self.lock_states().values().cloned().collect();
        states.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        states
    }

    pub fn latest_value(&self, station_id: &str) -> Option<Reading> {
        self.store.get(station_id)
    }

    pub fn latest_values(&self) -> HashMap<String, Reading> {
        self.store.get_all()
    }

    pub fn store(&self) -> &LatestValueStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Rounds completed by the run loop
    pub fn rounds_completed(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }
}
