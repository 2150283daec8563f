//! Station Registry
//!
//! Read-only list of the monitored weather stations. The set is fixed at
//! startup, so lookups need no locking.

mod defaults;
mod registry;

pub use defaults::default_stations;
pub use registry::{Station, StationRegistry};
