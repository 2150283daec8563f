//! Polling tiers and the rules for moving between them

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Canonical polling interval bucket, fastest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTier {
    /// Every minute
    #[default]
    Fast,
    /// Every 10 minutes
    Medium,
    /// Every hour
    Slow,
    /// Once a day
    #[serde(alias = "ultra_slow")]
    UltraSlow,
}

impl PollTier {
    pub const ALL: [PollTier; 4] = [
        PollTier::Fast,
        PollTier::Medium,
        PollTier::Slow,
        PollTier::UltraSlow,
    ];

    /// Time between polls
    pub fn interval(&self) -> Duration {
        match self {
            PollTier::Fast => Duration::minutes(1),
            PollTier::Medium => Duration::minutes(10),
            PollTier::Slow => Duration::hours(1),
            PollTier::UltraSlow => Duration::hours(24),
        }
    }

    /// Short label for status displays
    pub fn label(&self) -> &'static str {
        match self {
            PollTier::Fast => "1m",
            PollTier::Medium => "10m",
            PollTier::Slow => "60m",
            PollTier::UltraSlow => "24h",
        }
    }

    /// Next slower tier, saturating at `UltraSlow`
    pub fn slower(&self) -> PollTier {
        match self {
            PollTier::Fast => PollTier::Medium,
            PollTier::Medium => PollTier::Slow,
            PollTier::Slow | PollTier::UltraSlow => PollTier::UltraSlow,
        }
    }
}

/// Thresholds for tier adoption and demotion.
///
/// A gap is classified into the fastest tier whose upper bound it does not
/// exceed. Gaps outside `[min_gap_secs, max_gap_secs]` are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    pub fast_max_secs: i64,
    pub medium_max_secs: i64,
    pub slow_max_secs: i64,
    pub min_gap_secs: i64,
    pub max_gap_secs: i64,
    /// Consecutive misses that trigger a one-step demotion
    pub misses_before_demotion: u32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            fast_max_secs: 90,
            medium_max_secs: 12 * 60,
            slow_max_secs: 70 * 60,
            min_gap_secs: 30,
            max_gap_secs: 2 * 60 * 60,
            misses_before_demotion: 2,
        }
    }
}

impl TierPolicy {
    /// Round an observed publishing gap to a tier
    pub fn classify(&self, gap: Duration) -> PollTier {
        let secs = gap.num_seconds();
        if secs <= self.fast_max_secs {
            PollTier::Fast
        } else if secs <= self.medium_max_secs {
            PollTier::Medium
        } else if secs <= self.slow_max_secs {
            PollTier::Slow
        } else {
            PollTier::UltraSlow
        }
    }

    /// Smallest plausible gap between consecutive observations
    pub fn min_gap(&self, timestamps: &[DateTime<Utc>]) -> Option<Duration> {
        let mut sorted = timestamps.to_vec();
        sorted.sort();

        let lower = Duration::seconds(self.min_gap_secs);
        let upper = Duration::seconds(self.max_gap_secs);

        sorted
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|gap| *gap >= lower && *gap <= upper)
            .min()
    }

    /// Tier matching the cadence of a series, if it has one
    pub fn observed_tier(&self, timestamps: &[DateTime<Utc>]) -> Option<PollTier> {
        if timestamps.len() < 2 {
            return None;
        }
        self.min_gap(timestamps).map(|gap| self.classify(gap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn series(start: DateTime<Utc>, gaps: &[i64]) -> Vec<DateTime<Utc>> {
        let mut out = vec![start];
        let mut t = start;
        for gap in gaps {
            t += Duration::seconds(*gap);
            out.push(t);
        }
        out
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PollTier::Fast < PollTier::Medium);
        assert!(PollTier::Medium < PollTier::Slow);
        assert!(PollTier::Slow < PollTier::UltraSlow);
        for pair in PollTier::ALL.windows(2) {
            assert!(pair[0].interval() < pair[1].interval());
        }
    }

    #[test]
    fn test_slower_saturates() {
        assert_eq!(PollTier::Fast.slower(), PollTier::Medium);
        assert_eq!(PollTier::Slow.slower(), PollTier::UltraSlow);
        assert_eq!(PollTier::UltraSlow.slower(), PollTier::UltraSlow);
    }

    #[test]
    fn test_classify_boundaries() {
        let policy = TierPolicy::default();
        assert_eq!(policy.classify(Duration::seconds(60)), PollTier::Fast);
        assert_eq!(policy.classify(Duration::seconds(90)), PollTier::Fast);
        assert_eq!(policy.classify(Duration::seconds(91)), PollTier::Medium);
        assert_eq!(policy.classify(Duration::minutes(10)), PollTier::Medium);
        assert_eq!(policy.classify(Duration::minutes(12)), PollTier::Medium);
        assert_eq!(policy.classify(Duration::minutes(60)), PollTier::Slow);
        assert_eq!(policy.classify(Duration::minutes(71)), PollTier::UltraSlow);
    }

    #[test]
    fn test_min_gap_ignores_noise_and_outages() {
        let policy = TierPolicy::default();
        // 10s jitter, a 10 minute cadence, and a 3 hour outage
        let ts = series(t0(), &[10, 600, 600, 3 * 3600]);
        assert_eq!(policy.min_gap(&ts), Some(Duration::seconds(600)));
    }

    #[test]
    fn test_observed_tier_needs_two_points() {
        let policy = TierPolicy::default();
        assert_eq!(policy.observed_tier(&[]), None);
        assert_eq!(policy.observed_tier(&[t0()]), None);
        assert_eq!(
            policy.observed_tier(&series(t0(), &[600])),
            Some(PollTier::Medium)
        );
    }

    #[test]
    fn test_observed_tier_unordered_input() {
        let policy = TierPolicy::default();
        let mut ts = series(t0(), &[60, 60]);
        ts.reverse();
        assert_eq!(policy.observed_tier(&ts), Some(PollTier::Fast));
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&PollTier::UltraSlow).unwrap();
        assert_eq!(json, "\"ultraslow\"");
        let parsed: PollTier = serde_json::from_str("\"ultra_slow\"").unwrap();
        assert_eq!(parsed, PollTier::UltraSlow);
    }

    proptest! {
        #[test]
        fn prop_classify_is_monotonic(a in 0i64..200_000, b in 0i64..200_000) {
            let policy = TierPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.classify(Duration::seconds(lo)) <= policy.classify(Duration::seconds(hi)));
        }

        #[test]
        fn prop_uniform_cadence_maps_to_classified_tier(gap in 30i64..=7200, n in 2usize..20) {
            let policy = TierPolicy::default();
            let ts = series(t0(), &vec![gap; n - 1]);
            prop_assert_eq!(policy.observed_tier(&ts), Some(policy.classify(Duration::seconds(gap))));
        }

        #[test]
        fn prop_slower_never_speeds_up(idx in 0usize..4) {
            let tier = PollTier::ALL[idx];
            prop_assert!(tier.slower() >= tier);
        }
    }
}
