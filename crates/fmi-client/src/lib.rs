//! Upstream Observation Client
//!
//! Fetches wind observations for a batch of stations over one shared time
//! window. The scheduler only sees the [`FetchClient`] trait; [`FmiClient`]
//! talks to the FMI open data WFS service and [`ScriptedFetchClient`] replays
//! canned responses in tests.

mod client;
mod error;
mod observation;
mod parser;
mod query;
mod scripted;

pub use client::{FmiClient, FmiConfig};
pub use error::FetchError;
pub use observation::{BatchResult, Observation};
pub use parser::parse_multipoint_coverage;
pub use query::build_query_url;
pub use scripted::{FetchCall, ScriptedFetchClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Maximum number of stations the upstream accepts in one request
pub const MAX_BATCH_SIZE: usize = 20;

/// Source of per-station observation series
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetch observations for `station_ids` within `[start, end]`.
    ///
    /// Stations without data may be missing from a successful result.
    async fn fetch_batch(
        &self,
        station_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BatchResult, FetchError>;
}
