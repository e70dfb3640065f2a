//! # Jitter policy for deferred scheduling.
//!
//! [`JitterPolicy`] adds randomness to the delay of a [`Deferred`](super::Deferred)
//! cadence so that several drivers sharing a runtime do not wake up in lockstep.
//!
//! - [`JitterPolicy::None`]: no randomization, predictable delays
//! - [`JitterPolicy::Full`]: random delay in [0, delay]
//! - [`JitterPolicy::Equal`]: delay = delay/2 + random[0, delay/2]

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of scheduling delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterPolicy {
    /// No jitter: use the exact delay.
    #[default]
    None,

    /// Full jitter: random delay in [0, delay].
    Full,

    /// Equal jitter: delay = delay/2 + random[0, delay/2].
    ///
    /// Preserves ~75% of the original delay on average.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Self::full_jitter(delay),
            JitterPolicy::Equal => Self::equal_jitter(delay),
        }
    }

    /// Full jitter: random[0, delay]
    fn full_jitter(delay: Duration) -> Duration {
        let us = delay.as_micros() as u64;
        if us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..=us))
    }

    /// Equal jitter: delay/2 + random[0, delay/2]
    fn equal_jitter(delay: Duration) -> Duration {
        let us = delay.as_micros() as u64;
        if us == 0 {
            return Duration::ZERO;
        }
        let half = us / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::rng().random_range(0..=half)
        };
        Duration::from_micros(half + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_exact() {
        let d = Duration::from_millis(40);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn full_jitter_bounds() {
        let d = Duration::from_millis(10);
        for _ in 0..50 {
            assert!(JitterPolicy::Full.apply(d) <= d);
        }
    }

    #[test]
    fn equal_jitter_bounds() {
        let d = Duration::from_millis(10);
        for _ in 0..50 {
            let j = JitterPolicy::Equal.apply(d);
            assert!(j >= Duration::from_millis(5));
            assert!(j <= d);
        }
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }
}
