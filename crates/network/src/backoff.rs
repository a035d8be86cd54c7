// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Provides the bounded exponential backoff policy used to schedule reconnection attempts.
//!
//! The policy is pure: it holds configuration only, and the connection manager owns the
//! attempt counter and the timers. The nominal delay for attempt `n` is
//! `min(base_delay * 2^n, max_delay)`. A multiplicative jitter can be applied on top so that
//! many clients dropped by the same outage do not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Default cap applied to every reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default number of failed attempts after which reconnection is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default jitter ratio (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

/// A bounded exponential reconnection policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// The delay for attempt zero.
    base_delay: Duration,
    /// The maximum delay to cap the backoff.
    max_delay: Duration,
    /// The attempt count at which reconnection gives up.
    max_attempts: u32,
    /// The jitter ratio in `[0, 1)` applied by [`ReconnectPolicy::jittered_delay_for`].
    jitter: f64,
}

impl ReconnectPolicy {
    /// Creates a new [`ReconnectPolicy`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `base_delay` is zero.
    /// - `max_delay` is less than `base_delay`.
    /// - `max_attempts` is zero.
    /// - `jitter` is not finite or not in `[0, 1)`.
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        jitter: f64,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!base_delay.is_zero(), "base_delay must be positive");
        anyhow::ensure!(
            max_delay >= base_delay,
            "max_delay ({max_delay:?}) must be >= base_delay ({base_delay:?})"
        );
        anyhow::ensure!(max_attempts > 0, "max_attempts must be positive");
        anyhow::ensure!(
            jitter.is_finite() && (0.0..1.0).contains(&jitter),
            "jitter must be in [0, 1), was {jitter}"
        );

        Ok(Self {
            base_delay,
            max_delay,
            max_attempts,
            jitter,
        })
    }

    /// Returns the nominal delay before retry `attempt` (zero-based), without jitter.
    ///
    /// Saturates, so very large attempts yield `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u128.checked_shl(attempt).unwrap_or(u128::MAX);
        let scaled = self.base_delay.as_nanos().saturating_mul(multiplier);
        let capped = scaled.min(self.max_delay.as_nanos());
        Duration::from_nanos(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Returns [`Self::delay_for`] scaled by a uniform factor in `[1 - jitter, 1 + jitter]`,
    /// clamped to `max_delay`.
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter == 0.0 {
            return delay;
        }

        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Returns `true` once `attempt` has reached the attempt budget.
    #[must_use]
    pub const fn should_give_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(2, 4_000)]
    #[case(3, 8_000)]
    #[case(4, 16_000)]
    #[case(5, 30_000)]
    #[case(6, 30_000)]
    fn test_default_delays(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(attempt), Duration::from_millis(expected_ms));
    }

    #[rstest]
    fn test_delay_saturates_for_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(64), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for(200), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[rstest]
    #[case(0, false)]
    #[case(4, false)]
    #[case(5, true)]
    #[case(6, true)]
    fn test_should_give_up(#[case] attempt: u32, #[case] expected: bool) {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.should_give_up(attempt), expected);
    }

    #[rstest]
    fn test_zero_jitter_is_deterministic() {
        let policy = ReconnectPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(1_600),
            3,
            0.0,
        )
        .unwrap();

        for attempt in 0..8 {
            assert_eq!(policy.jittered_delay_for(attempt), policy.delay_for(attempt));
        }
    }

    #[rstest]
    fn test_jitter_within_bounds() {
        let policy = ReconnectPolicy::default();

        for _ in 0..100 {
            let delay = policy.jittered_delay_for(2);
            assert!(delay >= Duration::from_millis(3_200), "{delay:?}");
            assert!(delay <= Duration::from_millis(4_800), "{delay:?}");
        }
    }

    #[rstest]
    fn test_jitter_never_exceeds_cap() {
        let policy = ReconnectPolicy::default();

        for _ in 0..100 {
            assert!(policy.jittered_delay_for(10) <= DEFAULT_MAX_DELAY);
        }
    }

    #[rstest]
    #[case(Duration::ZERO, Duration::from_secs(1), 5, 0.2)]
    #[case(Duration::from_secs(2), Duration::from_secs(1), 5, 0.2)]
    #[case(Duration::from_secs(1), Duration::from_secs(2), 0, 0.2)]
    #[case(Duration::from_secs(1), Duration::from_secs(2), 5, 1.0)]
    #[case(Duration::from_secs(1), Duration::from_secs(2), 5, -0.1)]
    #[case(Duration::from_secs(1), Duration::from_secs(2), 5, f64::NAN)]
    fn test_new_rejects_invalid_parameters(
        #[case] base: Duration,
        #[case] max: Duration,
        #[case] max_attempts: u32,
        #[case] jitter: f64,
    ) {
        assert!(ReconnectPolicy::new(base, max, max_attempts, jitter).is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use super::*;

    fn policy_strategy() -> impl Strategy<Value = ReconnectPolicy> {
        (1u64..5_000, 0u64..120_000, 1u32..20, 0.0f64..0.9).prop_map(
            |(base_ms, extra_ms, max_attempts, jitter)| {
                ReconnectPolicy::new(
                    Duration::from_millis(base_ms),
                    Duration::from_millis(base_ms + extra_ms),
                    max_attempts,
                    jitter,
                )
                .unwrap()
            },
        )
    }

    proptest! {
        #[test]
        fn delay_is_capped_and_non_decreasing(policy in policy_strategy(), attempt in 0u32..200) {
            let delay = policy.delay_for(attempt);
            prop_assert!(delay <= policy.max_delay());
            prop_assert!(delay >= policy.base_delay());
            prop_assert!(policy.delay_for(attempt + 1) >= delay);
        }

        #[test]
        fn jittered_delay_stays_within_band(policy in policy_strategy(), attempt in 0u32..40) {
            let nominal = policy.delay_for(attempt);
            let jittered = policy.jittered_delay_for(attempt);
            let lower = nominal.mul_f64(1.0 - policy.jitter()).saturating_sub(Duration::from_micros(1));

            prop_assert!(jittered <= policy.max_delay());
            prop_assert!(jittered >= lower);
        }

        #[test]
        fn give_up_matches_attempt_budget(policy in policy_strategy(), attempt in 0u32..50) {
            prop_assert_eq!(policy.should_give_up(attempt), attempt >= policy.max_attempts());
        }
    }
}
