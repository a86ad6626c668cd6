//! Reconnect backoff with jitter.

use std::hash::{BuildHasher, RandomState};
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Exponential backoff between reconnect attempts.
///
/// Delays double from `initial_delay` up to `max_delay`, then stay there.
/// Each delay gets up to `jitter_percent`% added so that a fleet of bridges
/// does not reconnect in lockstep after a broker restart.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: u8,
    hasher: RandomState,
}

impl ReconnectBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, jitter_percent: u8) -> Self {
        ReconnectBackoff {
            initial_delay,
            max_delay,
            jitter_percent: jitter_percent.min(100),
            hasher: RandomState::new(),
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter_percent,
        )
    }

    /// The delay before reconnect attempt `attempt` (0-indexed), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// The delay before reconnect attempt `attempt`, with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_percent == 0 {
            return base;
        }
        let roll = self.hasher.hash_one(attempt) % (self.jitter_percent as u64 + 1);
        base.mul_f64(1.0 + roll as f64 / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delays_double_until_cap() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(500), Duration::from_secs(4), 0);
        let delays: Vec<_> = (0..6).map(|a| backoff.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 0);
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn jittered_delay_is_within_bounds(
            initial_ms in 1u64..5_000,
            max_ms in 5_000u64..120_000,
            jitter in 0u8..=100,
            attempt in 0u32..64,
        ) {
            let backoff = ReconnectBackoff::new(
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
                jitter,
            );
            let base = backoff.base_delay(attempt);
            let delay = backoff.delay_for_attempt(attempt);

            prop_assert!(base <= Duration::from_millis(max_ms));
            prop_assert!(delay >= base);
            prop_assert!(delay <= base.mul_f64(1.0 + jitter as f64 / 100.0) + Duration::from_nanos(1));
        }
    }
}
