//! FMI WFS client
//!
//! Executes batched multipoint coverage queries and hands back validated,
//! time-ordered observation series.

use crate::error::FetchError;
use crate::observation::{BatchResult, Observation};
use crate::parser::parse_multipoint_coverage;
use crate::query::build_query_url;
use crate::{FetchClient, MAX_BATCH_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_validator::{ValidationConfig, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Error bodies are truncated to this many characters in errors and logs
const MAX_ERROR_BODY: usize = 512;

/// Configuration for the upstream client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FmiConfig {
    /// WFS endpoint
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Range limits applied to every observation
    pub validation: ValidationConfig,
}

impl Default for FmiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://opendata.fmi.fi/wfs".to_string(),
            timeout_secs: 60,
            validation: ValidationConfig::default(),
        }
    }
}

/// HTTP client for the FMI open data service
pub struct FmiClient {
    http: reqwest::Client,
    base_url: String,
    validator: Validator,
}

impl FmiClient {
    /// Create a new client
    pub fn new(config: FmiConfig) -> Result<Self, FetchError> {
        info!("Creating FMI client for {}", config.base_url);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
            validator: Validator::new(config.validation),
        })
    }

    /// Drop invalid observations and order each series by time
    fn sanitize(&self, raw: BatchResult) -> BatchResult {
        raw.into_iter()
            .map(|(station_id, observations)| {
                let before = observations.len();
                let mut kept: Vec<Observation> = observations
                    .into_iter()
                    .filter(|o| {
                        self.validator
                            .validate_wind(o.wind_speed, o.wind_gust, o.wind_direction)
                            .valid
                    })
                    .collect();
                kept.sort_by_key(|o| o.timestamp);
                kept.dedup_by_key(|o| o.timestamp);

                if kept.len() < before {
                    debug!(
                        "Discarded {} invalid observations for station {}",
                        before - kept.len(),
                        station_id
                    );
                }
                (station_id, kept)
            })
            .collect()
    }
}

#[async_trait]
impl FetchClient for FmiClient {
    async fn fetch_batch(
        &self,
        station_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BatchResult, FetchError> {
        if station_ids.len() > MAX_BATCH_SIZE {
            return Err(FetchError::BatchTooLarge {
                requested: station_ids.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        if station_ids.is_empty() {
            return Ok(BatchResult::new());
        }

        let url = build_query_url(&self.base_url, station_ids, start, end)?;
        debug!("Fetching {} stations from {} to {}", station_ids.len(), start, end);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            let cut = body
                .char_indices()
                .nth(MAX_ERROR_BODY)
                .map_or(body.len(), |(i, _)| i);
            body.truncate(cut);
            warn!("Upstream returned HTTP {}", status.as_u16());
            return Err(FetchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let raw = parse_multipoint_coverage(&body)?;
        Ok(self.sanitize(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_drops_invalid_and_sorts() {
        let client = FmiClient::new(FmiConfig::default()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let mut raw = BatchResult::new();
        raw.insert(
            "1".to_string(),
            vec![
                Observation::new(t0 + chrono::Duration::minutes(10)).with_speed(4.0),
                Observation::new(t0).with_speed(3.0).with_direction(90.0),
                Observation::new(t0 + chrono::Duration::minutes(20)).with_speed(-1.0),
                Observation::new(t0 + chrono::Duration::minutes(30)).with_direction(400.0),
            ],
        );

        let clean = client.sanitize(raw);
        let series = &clean["1"];
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, t0);
        assert_eq!(series[1].wind_speed, Some(4.0));
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let client = FmiClient::new(FmiConfig::default()).unwrap();
        let ids: Vec<String> = (0..21).map(|i| i.to_string()).collect();
        let now = Utc::now();

        let result = client.fetch_batch(&ids, now, now).await;
        assert!(matches!(
            result,
            Err(FetchError::BatchTooLarge { requested: 21, max: 20 })
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let client = FmiClient::new(FmiConfig::default()).unwrap();
        let now = Utc::now();
        let result = client.fetch_batch(&[], now, now).await.unwrap();
        assert!(result.is_empty());
    }
}
