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

//! Real-time and static `Clock` implementations.
//!
//! Freshness tiers and receive timestamps are computed against a [`Clock`] so that tests can
//! drive wall-clock time deterministically with [`TestClock`].

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

use crate::UnixNanos;

/// Represents a source of wall-clock time.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current UNIX timestamp in nanoseconds (ns).
    fn timestamp_ns(&self) -> UnixNanos;

    /// Returns the current date and time as a timezone-aware `DateTime<UTC>`.
    fn utc_now(&self) -> DateTime<Utc> {
        self.timestamp_ns().to_datetime_utc()
    }

    /// Returns the current UNIX timestamp in milliseconds (ms).
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ns().as_millis()
    }
}

/// A real-time clock which uses system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveClock;

impl LiveClock {
    /// Creates a new [`LiveClock`] instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for LiveClock {
    fn timestamp_ns(&self) -> UnixNanos {
        // A system clock set before 1970 reads as the epoch
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        UnixNanos::default().saturating_add(since_epoch)
    }
}

/// A static test clock.
///
/// Stores the current timestamp internally which can be set or advanced. Interior mutability
/// lets a shared `Arc<TestClock>` be advanced while components hold it as `Arc<dyn Clock>`.
#[derive(Debug, Default)]
pub struct TestClock {
    time: AtomicU64,
}

impl TestClock {
    /// Creates a new [`TestClock`] instance starting at the UNIX epoch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
        }
    }

    /// Creates a new [`TestClock`] instance starting at `time`.
    #[must_use]
    pub const fn starting_at(time: UnixNanos) -> Self {
        Self {
            time: AtomicU64::new(time.as_u64()),
        }
    }

    /// Sets the clock to `time`.
    pub fn set_time(&self, time: UnixNanos) {
        self.time.store(time.as_u64(), Ordering::SeqCst);
    }

    /// Advances the clock by `duration` and returns the new time.
    pub fn advance(&self, duration: Duration) -> UnixNanos {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let previous = self.time.fetch_add(delta, Ordering::SeqCst);
        UnixNanos::new(previous.saturating_add(delta))
    }
}

impl Clock for TestClock {
    fn timestamp_ns(&self) -> UnixNanos {
        UnixNanos::new(self.time.load(Ordering::SeqCst))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn test_clock() -> TestClock {
        TestClock::new()
    }

    #[rstest]
    fn test_test_clock_starts_at_epoch(test_clock: TestClock) {
        assert!(test_clock.timestamp_ns().is_zero());
        assert_eq!(test_clock.utc_now().timestamp(), 0);
    }

    #[rstest]
    fn test_test_clock_advance(test_clock: TestClock) {
        let now = test_clock.advance(Duration::from_millis(1_500));
        assert_eq!(now, UnixNanos::from_millis(1_500));
        assert_eq!(test_clock.timestamp_ms(), 1_500);
    }

    #[rstest]
    fn test_test_clock_set_time(test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from_millis(42));
        assert_eq!(test_clock.timestamp_ns(), UnixNanos::from_millis(42));
    }

    #[rstest]
    fn test_shared_test_clock_visible_through_trait_object() {
        let clock = Arc::new(TestClock::starting_at(UnixNanos::from_millis(10)));
        let shared: Arc<dyn Clock> = clock.clone();

        clock.advance(Duration::from_millis(5));

        assert_eq!(shared.timestamp_ms(), 15);
    }

    #[rstest]
    fn test_live_clock_is_after_2020() {
        let clock = LiveClock::new();
        // 2020-01-01T00:00:00Z
        assert!(clock.timestamp_ms() > 1_577_836_800_000);
    }
}
