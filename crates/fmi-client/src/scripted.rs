//! Scripted client for tests and offline runs

use crate::error::FetchError;
use crate::observation::BatchResult;
use crate::{FetchClient, MAX_BATCH_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A recorded `fetch_batch` call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub station_ids: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Replays queued responses in order and records every call.
///
/// When the queue is empty every call succeeds with no data.
#[derive(Default)]
pub struct ScriptedFetchClient {
    responses: Mutex<VecDeque<Result<BatchResult, FetchError>>>,
    calls: Mutex<Vec<FetchCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedFetchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn push_ok(&self, result: BatchResult) {
        lock(&self.responses).push_back(Ok(result));
    }

    /// Queue a failed response
    pub fn push_err(&self, err: FetchError) {
        lock(&self.responses).push_back(Err(err));
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl FetchClient for ScriptedFetchClient {
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

        lock(&self.calls).push(FetchCall {
            station_ids: station_ids.to_vec(),
            start,
            end,
        });
        debug!("Scripted fetch for {} stations", station_ids.len());

        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(BatchResult::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Observation;

    #[tokio::test]
    async fn test_replays_in_order() {
        let client = ScriptedFetchClient::new();
        let now = Utc::now();

        let mut first = BatchResult::new();
        first.insert("a".into(), vec![Observation::new(now).with_speed(1.0)]);
        client.push_ok(first);
        client.push_err(FetchError::Timeout);

        let ids = vec!["a".to_string()];
        assert_eq!(client.fetch_batch(&ids, now, now).await.unwrap().len(), 1);
        assert!(matches!(
            client.fetch_batch(&ids, now, now).await,
            Err(FetchError::Timeout)
        ));
        assert!(client.fetch_batch(&ids, now, now).await.unwrap().is_empty());
        assert_eq!(client.call_count(), 3);
    }
}
