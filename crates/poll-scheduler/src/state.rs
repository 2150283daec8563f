//! Per-station polling state

use crate::tier::{PollTier, TierPolicy};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Polling state for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollState {
    pub station_id: String,
    #[serde(default)]
    pub tier: PollTier,
    #[serde(default)]
    pub consecutive_misses: u32,
    #[serde(default)]
    pub last_polled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_observation: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_polls: u64,
    #[serde(default)]
    pub successful_polls: u64,
}

/// What a single poll did to a station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// New observations arrived
    NewData { observations: usize },
    /// Nothing new; `demoted` is set when this miss moved the tier
    Miss { demoted: bool },
}

/// Status view published to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub station_id: String,
    pub tier: PollTier,
    pub interval: &'static str,
    pub success_rate: f64,
    pub consecutive_misses: u32,
    pub total_polls: u64,
    pub successful_polls: u64,
    pub last_polled: Option<DateTime<Utc>>,
    pub last_observation: Option<DateTime<Utc>>,
}

impl PollState {
    /// Fresh state: fastest tier, never polled
    pub fn new(station_id: &str) -> Self {
        Self {
            station_id: station_id.to_string(),
            tier: PollTier::Fast,
            consecutive_misses: 0,
            last_polled: None,
            last_observation: None,
            total_polls: 0,
            successful_polls: 0,
        }
    }

    /// Fraction of polls that returned data
    pub fn success_rate(&self) -> f64 {
        if self.total_polls == 0 {
            0.0
        } else {
            self.successful_polls as f64 / self.total_polls as f64
        }
    }

    /// Whether `interval` has elapsed since the last poll
    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_polled {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    /// Apply a successful fetch. An empty series counts as a miss.
    pub fn record_observations(
        &mut self,
        now: DateTime<Utc>,
        timestamps: &[DateTime<Utc>],
        policy: &TierPolicy,
    ) -> PollOutcome {
        let Some(newest) = timestamps.iter().max().copied() else {
            return self.record_miss(now, policy);
        };

        self.last_polled = Some(now);
        self.total_polls += 1;
        self.successful_polls += 1;
        self.consecutive_misses = 0;
        self.last_observation = Some(self.last_observation.map_or(newest, |t| t.max(newest)));

        // Faster cadences are adopted at once; slower ones move one step per success
        if let Some(observed) = policy.observed_tier(timestamps) {
            if observed < self.tier {
                self.tier = observed;
            } else if observed > self.tier {
                self.tier = self.tier.slower();
            }
        }

        PollOutcome::NewData {
            observations: timestamps.len(),
        }
    }

    /// Apply a poll that produced nothing, whether empty or failed
    pub fn record_miss(&mut self, now: DateTime<Utc>, policy: &TierPolicy) -> PollOutcome {
        self.last_polled = Some(now);
        self.total_polls += 1;
        self.consecutive_misses += 1;

        let demoted = self.consecutive_misses >= policy.misses_before_demotion.max(1);
        if demoted {
            self.tier = self.tier.slower();
            self.consecutive_misses = 0;
        }

        PollOutcome::Miss { demoted }
    }

    pub fn status(&self) -> StationStatus {
        StationStatus {
            station_id: self.station_id.clone(),
            tier: self.tier,
            interval: self.tier.label(),
            success_rate: self.success_rate(),
            consecutive_misses: self.consecutive_misses,
            total_polls: self.total_polls,
            successful_polls: self.successful_polls,
            last_polled: self.last_polled,
            last_observation: self.last_observation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_state_is_due() {
        let state = PollState::new("100996");
        assert_eq!(state.tier, PollTier::Fast);
        assert!(state.is_due(t0(), PollTier::UltraSlow.interval()));
        assert_eq!(state.success_rate(), 0.0);
    }

    #[test]
    fn test_is_due_after_interval() {
        let mut state = PollState::new("100996");
        state.last_polled = Some(t0());
        assert!(!state.is_due(t0() + Duration::seconds(59), PollTier::Fast.interval()));
        assert!(state.is_due(t0() + Duration::seconds(60), PollTier::Fast.interval()));
    }

    #[test]
    fn test_two_misses_demote_one_step() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");

        assert_eq!(state.record_miss(t0(), &policy), PollOutcome::Miss { demoted: false });
        assert_eq!(state.tier, PollTier::Fast);
        assert_eq!(state.consecutive_misses, 1);

        assert_eq!(state.record_miss(t0(), &policy), PollOutcome::Miss { demoted: true });
        assert_eq!(state.tier, PollTier::Medium);
        assert_eq!(state.consecutive_misses, 0);
    }

    #[test]
    fn test_data_resets_misses() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");
        state.record_miss(t0(), &policy);

        let outcome = state.record_observations(t0(), &[t0()], &policy);
        assert_eq!(outcome, PollOutcome::NewData { observations: 1 });
        assert_eq!(state.consecutive_misses, 0);
        assert_eq!(state.successful_polls, 1);
        assert_eq!(state.total_polls, 2);
        assert_eq!(state.success_rate(), 0.5);
    }

    #[test]
    fn test_ten_minute_cadence_moves_fast_to_medium() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");
        state.consecutive_misses = 1;

        let ts = [t0(), t0() + Duration::minutes(10), t0() + Duration::minutes(20)];
        state.record_observations(t0() + Duration::minutes(21), &ts, &policy);

        assert_eq!(state.tier, PollTier::Medium);
        assert_eq!(state.last_observation, Some(ts[2]));
    }

    #[test]
    fn test_faster_cadence_promotes_immediately() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");
        state.tier = PollTier::UltraSlow;

        let ts = [t0(), t0() + Duration::minutes(1)];
        state.record_observations(t0() + Duration::minutes(2), &ts, &policy);
        assert_eq!(state.tier, PollTier::Fast);
    }

    #[test]
    fn test_slower_cadence_moves_one_step_per_success() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");

        let ts = [t0(), t0() + Duration::minutes(75)];
        state.record_observations(t0() + Duration::minutes(76), &ts, &policy);
        assert_eq!(state.tier, PollTier::Medium);
        assert_eq!(state.consecutive_misses, 0);

        let ts = [t0() + Duration::minutes(150), t0() + Duration::minutes(225)];
        state.record_observations(t0() + Duration::minutes(226), &ts, &policy);
        assert_eq!(state.tier, PollTier::Slow);

        let ts = [t0() + Duration::minutes(300), t0() + Duration::minutes(375)];
        state.record_observations(t0() + Duration::minutes(376), &ts, &policy);
        assert_eq!(state.tier, PollTier::UltraSlow);
    }

    #[test]
    fn test_single_observation_keeps_tier() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");
        state.tier = PollTier::Slow;
        state.record_observations(t0(), &[t0()], &policy);
        assert_eq!(state.tier, PollTier::Slow);
    }

    #[test]
    fn test_empty_series_is_a_miss() {
        let policy = TierPolicy::default();
        let mut state = PollState::new("100996");
        assert_eq!(
            state.record_observations(t0(), &[], &policy),
            PollOutcome::Miss { demoted: false }
        );
        assert_eq!(state.successful_polls, 0);
        assert_eq!(state.total_polls, 1);
    }

    #[test]
    fn test_state_json_ignores_unknown_fields() {
        let json = r#"{"station_id":"100996","tier":"slow","current_interval":600,"consecutive_misses":1}"#;
        let state: PollState = serde_json::from_str(json).unwrap();
        assert_eq!(state.tier, PollTier::Slow);
        assert_eq!(state.consecutive_misses, 1);
        assert!(state.last_polled.is_none());
    }

    proptest! {
        #[test]
        fn prop_misses_demote_monotonically(
            polls in proptest::collection::vec(proptest::option::of(1usize..5), 1..50)
        ) {
            let policy = TierPolicy::default();
            let mut state = PollState::new("100996");
            let mut now = t0();

            for poll in polls {
                now += Duration::minutes(10);
                let before = state.tier;
                match poll {
                    None => {
                        let was = state.consecutive_misses;
                        state.record_miss(now, &policy);
                        if was + 1 >= policy.misses_before_demotion {
                            prop_assert_eq!(state.tier, before.slower());
                            prop_assert_eq!(state.consecutive_misses, 0);
                        } else {
                            prop_assert_eq!(state.tier, before);
                        }
                    }
                    Some(n) => {
                        let ts: Vec<_> = (0..n)
                            .map(|i| now - Duration::minutes(10 * i as i64))
                            .collect();
                        state.record_observations(now, &ts, &policy);
                        prop_assert_eq!(state.consecutive_misses, 0);
                        prop_assert!(state.tier <= before.slower());
                    }
                }
                prop_assert!(PollTier::ALL.contains(&state.tier));
                prop_assert!(state.successful_polls <= state.total_polls);
            }
        }
    }
}
