//! Grouping due stations into upstream calls

use crate::state::PollState;
use chrono::{DateTime, Duration, Timelike, Utc};
use fmi_client::MAX_BATCH_SIZE;
use std::collections::BTreeMap;

/// One upstream call: stations sharing a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollBatch {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub station_ids: Vec<String>,
}

fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Window start for a station: the default lookback, or just after the
/// newest observation already seen if that is later.
pub fn effective_start(state: &PollState, now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let default_start = truncate_to_second(now - window);
    let start = match state.last_observation {
        Some(last) => truncate_to_second(last + Duration::seconds(1)).max(default_start),
        None => default_start,
    };
    start.min(now)
}

/// Group stations by effective window start and split each group into
/// batches of at most `max_batch_size` (never above the upstream cap).
///
/// Groups come out ordered by start time; ids keep the input order.
pub fn plan_batches(
    due: &[PollState],
    now: DateTime<Utc>,
    window: Duration,
    max_batch_size: usize,
) -> Vec<PollBatch> {
    let cap = max_batch_size.clamp(1, MAX_BATCH_SIZE);

    let mut groups: BTreeMap<DateTime<Utc>, Vec<String>> = BTreeMap::new();
    for state in due {
        groups
            .entry(effective_start(state, now, window))
            .or_default()
            .push(state.station_id.clone());
    }

    groups
        .into_iter()
        .flat_map(|(start, ids)| {
            ids.chunks(cap)
                .map(|chunk| PollBatch {
                    start,
                    end: now,
                    station_ids: chunk.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn window() -> Duration {
        Duration::hours(2)
    }

    fn state(id: &str, last_observation: Option<DateTime<Utc>>) -> PollState {
        let mut s = PollState::new(id);
        s.last_observation = last_observation;
        s
    }

    #[test]
    fn test_effective_start_defaults_to_window() {
        let s = state("1", None);
        assert_eq!(effective_start(&s, now(), window()), now() - window());
    }

    #[test]
    fn test_effective_start_after_last_observation() {
        let last = now() - Duration::minutes(30) + Duration::milliseconds(250);
        let s = state("1", Some(last));
        assert_eq!(
            effective_start(&s, now(), window()),
            now() - Duration::minutes(30) + Duration::seconds(1)
        );
    }

    #[test]
    fn test_old_observation_uses_default_start() {
        let s = state("1", Some(now() - Duration::hours(5)));
        assert_eq!(effective_start(&s, now(), window()), now() - window());
    }

    #[test]
    fn test_future_observation_clamped_to_now() {
        let s = state("1", Some(now() + Duration::hours(1)));
        assert_eq!(effective_start(&s, now(), window()), now());
    }

    #[test]
    fn test_groups_by_start() {
        let recent = now() - Duration::minutes(5);
        let due = vec![
            state("a", None),
            state("b", Some(recent)),
            state("c", None),
            state("d", Some(recent)),
        ];
        let batches = plan_batches(&due, now(), window(), 20);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].start, now() - window());
        assert_eq!(batches[0].station_ids, vec!["a", "c"]);
        assert_eq!(batches[1].station_ids, vec!["b", "d"]);
        assert!(batches.iter().all(|b| b.end == now()));
    }

    #[test]
    fn test_splits_large_groups() {
        let due: Vec<_> = (0..45).map(|i| state(&i.to_string(), None)).collect();
        let batches = plan_batches(&due, now(), window(), 20);
        let sizes: Vec<_> = batches.iter().map(|b| b.station_ids.len()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
    }

    #[test]
    fn test_configured_size_cannot_exceed_upstream_cap() {
        let due: Vec<_> = (0..30).map(|i| state(&i.to_string(), None)).collect();
        let batches = plan_batches(&due, now(), window(), 500);
        assert!(batches.iter().all(|b| b.station_ids.len() <= MAX_BATCH_SIZE));
    }

    #[test]
    fn test_no_due_stations() {
        assert!(plan_batches(&[], now(), window(), 20).is_empty());
    }

    proptest! {
        #[test]
        fn prop_batches_capped_and_groups_unsplit(
            offsets in proptest::collection::vec(proptest::option::of(0i64..4), 0..80)
        ) {
            let due: Vec<_> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| state(
                    &format!("s{}", i),
                    off.map(|m| now() - Duration::minutes(m * 15)),
                ))
                .collect();
            let batches = plan_batches(&due, now(), window(), 20);

            let mut start_of: HashMap<String, DateTime<Utc>> = HashMap::new();
            let mut seen = 0;
            for batch in &batches {
                prop_assert!(!batch.station_ids.is_empty());
                prop_assert!(batch.station_ids.len() <= 20);
                for id in &batch.station_ids {
                    seen += 1;
                    prop_assert!(start_of.insert(id.clone(), batch.start).is_none());
                }
            }
            prop_assert_eq!(seen, due.len());

            // Same effective start never lands under two different keys
            for s in &due {
                prop_assert_eq!(start_of[&s.station_id], effective_start(s, now(), window()));
            }
        }
    }
}
