use std::time::Duration;

use rand::Rng;

pub const BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const MAX_DELAY: Duration = Duration::from_millis(16_000);
pub const JITTER_RATIO: f64 = 0.1;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Upper bound of the jitter as a fraction of the capped delay.
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
            jitter_ratio: JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^attempt, max)` without jitter.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let pow = attempt.min(31); // prevent overflow
        self.base.saturating_mul(1u32 << pow).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, rand::rng().random_range(0.0..=1.0))
    }

    /// Delay for `attempt` with the jitter fraction fixed to `unit` (0.0 ..= 1.0).
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let capped = self.capped_delay(attempt);
        let jitter = capped.mul_f64(self.jitter_ratio.max(0.0) * unit.clamp(0.0, 1.0));
        capped.saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..7).map(|a| policy.capped_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 16_000, 16_000]);
        assert_eq!(policy.capped_delay(u32::MAX), MAX_DELAY);
    }

    #[test]
    fn jitter_is_added_within_ten_percent() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_with(1, 0.0), Duration::from_millis(2_000));
        assert_eq!(policy.delay_with(1, 1.0), Duration::from_millis(2_200));
        assert_eq!(policy.delay_with(4, 1.0), Duration::from_millis(17_600));
        for attempt in 0..6 {
            let delay = policy.delay(attempt);
            let floor = policy.capped_delay(attempt);
            assert!(delay >= floor);
            assert!(delay <= floor + floor / 10 + Duration::from_micros(1));
        }
    }
}
