//! Subscriber registry and fan-out

use crate::event::{BroadcastEvent, EventIdGenerator, ResumeToken};
use chrono::Utc;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber queue capacity
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { queue_capacity: 100 }
    }
}

/// One queued event plus the id to put on the wire for it.
///
/// `wire_id` only advances while the subscriber has received every event in
/// order since its catch-up completed; otherwise it repeats the last
/// trustworthy position.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub wire_id: u64,
    pub event: BroadcastEvent,
}

/// Identifies one registration of a subscriber id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberHandle {
    id: String,
    generation: u64,
}

impl SubscriberHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Receiving side of a subscription
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriberHandle,
    receiver: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    /// Next queued event; `None` once the hub dropped this subscriber
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    pub fn into_parts(self) -> (SubscriberHandle, mpsc::Receiver<Delivery>) {
        (self.handle, self.receiver)
    }
}

/// Passed to connect observers
#[derive(Debug, Clone)]
pub struct ConnectedSubscriber {
    pub handle: SubscriberHandle,
    pub resume: Option<ResumeToken>,
}

/// Hook invoked for every newly connected subscriber.
///
/// Runs on its own task, off the connection path.
pub trait ConnectObserver: Send + Sync {
    fn on_connect(&self, hub: &BroadcastHub, subscriber: &ConnectedSubscriber);
}

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub event_id: u64,
    pub delivered: usize,
    pub dropped: usize,
}

enum Outcome {
    Delivered,
    Dropped,
    Closed,
}

struct SubscriberSlot {
    generation: u64,
    sender: mpsc::Sender<Delivery>,
    resume: Option<ResumeToken>,
    watermark: u64,
    caught_up: bool,
    lossy: bool,
}

impl SubscriberSlot {
    fn deliver(&mut self, event: &BroadcastEvent, live: bool) -> Outcome {
        let resumable = live && self.caught_up && !self.lossy;
        let wire_id = if resumable { event.id } else { self.watermark };

        match self.sender.try_send(Delivery {
            wire_id,
            event: event.clone(),
        }) {
            Ok(()) => {
                if resumable {
                    self.watermark = event.id;
                }
                Outcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.lossy = true;
                Outcome::Dropped
            }
            Err(TrySendError::Closed(_)) => Outcome::Closed,
        }
    }
}

/// Push broadcast hub
pub struct BroadcastHub {
    config: HubConfig,
    subscribers: Mutex<HashMap<String, SubscriberSlot>>,
    observers: Mutex<Vec<Arc<dyn ConnectObserver>>>,
    ids: EventIdGenerator,
    generations: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// Create a new hub
    pub fn new(config: HubConfig) -> Self {
        info!(
            "Creating broadcast hub with queue capacity {}",
            config.queue_capacity
        );

        Self {
            config,
            subscribers: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            ids: EventIdGenerator::new(),
            generations: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, HashMap<String, SubscriberSlot>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_count(count: usize) {
        gauge!("windwatch_subscribers").set(count as f64);
    }

    /// Register a subscriber, replacing any existing one with the same id.
    ///
    /// The replaced subscriber's queue is closed.
    pub fn subscribe(&self, id: &str, resume: Option<ResumeToken>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;

        // A token from the future cannot be a real position in this stream
        let watermark = resume
            .filter(|token| token.0 <= self.ids.current())
            .map_or(0, |token| token.0);

        let slot = SubscriberSlot {
            generation,
            sender,
            resume,
            watermark,
            caught_up: false,
            lossy: false,
        };

        let (replaced, count) = {
            let mut subscribers = self.lock_subscribers();
            let replaced = subscribers.insert(id.to_string(), slot).is_some();
            (replaced, subscribers.len())
        };

        Self::record_count(count);
        if replaced {
            info!("Subscriber {} reconnected, old queue closed (total: {})", id, count);
        } else {
            info!("Subscriber {} connected (total: {})", id, count);
        }

        Subscription {
            handle: SubscriberHandle {
                id: id.to_string(),
                generation,
            },
            receiver,
        }
    }

    /// Remove a subscriber by id. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let (removed, count) = {
            let mut subscribers = self.lock_subscribers();
            let removed = subscribers.remove(id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            Self::record_count(count);
            info!("Subscriber {} disconnected (total: {})", id, count);
        }
        removed
    }

    /// Remove the registration behind `handle`, leaving a newer one alone
    pub fn release(&self, handle: &SubscriberHandle) -> bool {
        let (removed, count) = {
            let mut subscribers = self.lock_subscribers();
            let matches = subscribers
                .get(&handle.id)
                .is_some_and(|slot| slot.generation == handle.generation);
            if matches {
                subscribers.remove(&handle.id);
            }
            (matches, subscribers.len())
        };

        if removed {
            Self::record_count(count);
            info!("Subscriber {} disconnected (total: {})", handle.id, count);
        } else {
            debug!(
                "Subscriber {} generation {} already replaced",
                handle.id, handle.generation
            );
        }
        removed
    }

    /// Close every subscriber queue
    pub fn close_all(&self) {
        let closed = {
            let mut subscribers = self.lock_subscribers();
            let closed = subscribers.len();
            subscribers.clear();
            closed
        };
        Self::record_count(0);
        info!("Closed {} subscriber queues", closed);
    }

    fn stamp(&self, event: &mut BroadcastEvent) {
        if event.id == 0 {
            event.id = self.ids.next_id();
        } else {
            self.ids.observe(event.id);
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }
    }

    /// Offer an event to every subscriber without blocking
    pub fn publish(&self, mut event: BroadcastEvent) -> PublishReport {
        self.stamp(&mut event);

        let mut report = PublishReport {
            event_id: event.id,
            ..Default::default()
        };

        {
            let mut subscribers = self.lock_subscribers();
            for (id, slot) in subscribers.iter_mut() {
                match slot.deliver(&event, true) {
                    Outcome::Delivered => report.delivered += 1,
                    Outcome::Dropped => {
                        report.dropped += 1;
                        debug!("Queue full for subscriber {}, dropped event {}", id, event.id);
                    }
                    Outcome::Closed => debug!("Subscriber {} queue already closed", id),
                }
            }
        }

        counter!("windwatch_events_published_total").increment(1);
        if report.dropped > 0 {
            self.dropped
                .fetch_add(report.dropped as u64, Ordering::Relaxed);
            counter!("windwatch_events_dropped_total").increment(report.dropped as u64);
        }

        debug!(
            "Published {:?} event {} to {} subscribers",
            event.kind, event.id, report.delivered
        );
        report
    }

    fn send_where<F>(&self, id: &str, accept: F, mut event: BroadcastEvent) -> bool
    where
        F: Fn(&SubscriberSlot) -> bool,
    {
        self.stamp(&mut event);

        let outcome = {
            let mut subscribers = self.lock_subscribers();
            let Some(slot) = subscribers.get_mut(id) else {
                return false;
            };
            if !accept(slot) {
                return false;
            }
            slot.deliver(&event, false)
        };

        match outcome {
            Outcome::Delivered => true,
            Outcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("windwatch_events_dropped_total").increment(1);
                warn!("Queue full for subscriber {}, dropped event {}", id, event.id);
                false
            }
            Outcome::Closed => false,
        }
    }

    /// Offer an event to one subscriber by id
    pub fn send_to_one(&self, id: &str, event: BroadcastEvent) -> bool {
        self.send_where(id, |_| true, event)
    }

    /// Offer an event to exactly the registration behind `handle`
    pub fn send_to(&self, handle: &SubscriberHandle, event: BroadcastEvent) -> bool {
        let generation = handle.generation;
        self.send_where(&handle.id, |slot| slot.generation == generation, event)
    }

    /// Mark a subscriber's catch-up as complete; later live events carry
    /// their own ids on the wire.
    pub fn mark_caught_up(&self, handle: &SubscriberHandle) -> bool {
        let mut subscribers = self.lock_subscribers();
        match subscribers.get_mut(&handle.id) {
            Some(slot) if slot.generation == handle.generation => {
                slot.caught_up = true;
                true
            }
            _ => false,
        }
    }

    /// Register a connect observer
    pub fn on_connect(&self, observer: Arc<dyn ConnectObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Run every connect observer for `handle` on its own task
    pub fn notify_connected(self: &Arc<Self>, handle: &SubscriberHandle) {
        let resume = {
            let subscribers = self.lock_subscribers();
            match subscribers.get(&handle.id) {
                Some(slot) if slot.generation == handle.generation => slot.resume,
                _ => return,
            }
        };

        let observers: Vec<Arc<dyn ConnectObserver>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            let hub = Arc::clone(self);
            let subscriber = ConnectedSubscriber {
                handle: handle.clone(),
                resume,
            };
            tokio::spawn(async move {
                observer.on_connect(&hub, &subscriber);
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.lock_subscribers().is_empty()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.lock_subscribers().contains_key(id)
    }

    /// Allocate an event id ahead of publishing
    pub fn next_event_id(&self) -> u64 {
        self.ids.next_id()
    }

    pub fn current_event_id(&self) -> u64 {
        self.ids.current()
    }

    /// Keep new ids above an id restored from disk
    pub fn observe_event_id(&self, id: u64) {
        self.ids.observe(id);
    }

    /// Events dropped on full queues since startup
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
