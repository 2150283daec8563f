//! Push Broadcast Hub
//!
//! Fans live events out to per-subscriber bounded queues. Publishing never
//! blocks: a full queue drops that subscriber's copy only. Subscribers carry a
//! resume watermark so a reconnecting client can ask for what it missed.

mod event;
mod hub;

pub use event::{BroadcastEvent, EventIdGenerator, EventKind, ResumeToken};
pub use hub::{
    BroadcastHub, ConnectObserver, ConnectedSubscriber, Delivery, HubConfig, PublishReport,
    SubscriberHandle, Subscription,
};
