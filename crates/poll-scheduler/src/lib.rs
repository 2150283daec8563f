//! Adaptive Poll Scheduler
//!
//! Tracks a polling tier per station, groups due stations into batches that
//! share one upstream time window, and feeds results into the latest-value
//! store and the broadcast hub. Network calls never run under a state lock.

mod batch;
mod scheduler;
mod state;
mod tier;

pub use batch::{effective_start, plan_batches, PollBatch};
pub use scheduler::{PollScheduler, RoundReport, SchedulerConfig, StateFiles};
pub use state::{PollOutcome, PollState, StationStatus};
pub use tier::{PollTier, TierPolicy};
