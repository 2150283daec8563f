//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Limits the REST read endpoints per peer IP using tower_governor. The live
//! event stream is not limited; a browser reconnects to it on its own.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tracing::warn;

/// Governor config with X-RateLimit-* headers enabled
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 20,
        }
    }
}

/// Build a governor config for `config`.
///
/// Returns `None` for a zero rate or burst, which governor rejects. Requires
/// the service to use `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    let built = GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish();

    if built.is_none() {
        warn!(
            "Invalid rate limit (per_second={}, burst_size={}), rate limiting disabled",
            config.per_second, config.burst_size
        );
    }
    built.map(Arc::new)
}
