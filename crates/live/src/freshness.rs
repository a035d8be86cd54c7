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

//! Freshness bookkeeping: how stale each topic's latest data is, and when it should refresh.
//!
//! Tiers are relative to the refresh interval: `Fresh` below 60% of it, `Stale` below 120%,
//! `Old` beyond. Nothing is stored except the last update time; tiers and countdowns are
//! recomputed on demand from a caller-supplied `now`.

use std::{collections::BTreeMap, time::Duration};

use ahash::AHashMap;
use airfeed_core::UnixNanos;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::messages::Topic;

/// Coarse classification of how current a topic's last update is.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FreshnessTier {
    Fresh,
    Stale,
    Old,
}

/// The last update time of one active topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreshnessRecord {
    pub topic: Topic,
    /// `None` until the first message or successful poll.
    pub last_updated: Option<UnixNanos>,
    pub refresh_interval: Duration,
}

impl FreshnessRecord {
    /// Creates a new [`FreshnessRecord`] which has never been updated.
    #[must_use]
    pub const fn new(topic: Topic, refresh_interval: Duration) -> Self {
        Self {
            topic,
            last_updated: None,
            refresh_interval,
        }
    }

    /// Returns the time since the last update, or `None` if never updated.
    ///
    /// A `now` earlier than the last update counts as zero elapsed.
    #[must_use]
    pub fn elapsed(&self, now: UnixNanos) -> Option<Duration> {
        self.last_updated.map(|last| now.elapsed_since(last))
    }
}

/// Returns the freshness tier of `record` at `now`.
///
/// A record which has never been updated is [`FreshnessTier::Old`].
#[must_use]
pub fn tier_for(record: &FreshnessRecord, now: UnixNanos) -> FreshnessTier {
    let Some(elapsed) = record.elapsed(now) else {
        return FreshnessTier::Old;
    };

    // elapsed < 0.6 * interval  <=>  10 * elapsed < 6 * interval
    let elapsed = elapsed.as_nanos().saturating_mul(10);
    let interval = record.refresh_interval.as_nanos();

    if elapsed < interval.saturating_mul(6) {
        FreshnessTier::Fresh
    } else if elapsed < interval.saturating_mul(12) {
        FreshnessTier::Stale
    } else {
        FreshnessTier::Old
    }
}

/// Returns the time until `record` is due a refresh, never negative.
///
/// A record which has never been updated is due immediately.
#[must_use]
pub fn next_refresh_in(record: &FreshnessRecord, now: UnixNanos) -> Duration {
    record
        .elapsed(now)
        .map_or(Duration::ZERO, |elapsed| {
            record.refresh_interval.saturating_sub(elapsed)
        })
}

/// Holds one [`FreshnessRecord`] per active topic.
#[derive(Clone, Debug)]
pub struct FreshnessTracker {
    refresh_interval: Duration,
    records: AHashMap<Topic, FreshnessRecord>,
}

impl FreshnessTracker {
    /// Creates a new [`FreshnessTracker`] instance.
    #[must_use]
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            records: AHashMap::new(),
        }
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Starts tracking `topic`. Returns `false` if it was already tracked.
    pub fn track(&mut self, topic: Topic) -> bool {
        if self.records.contains_key(&topic) {
            return false;
        }
        self.records
            .insert(topic, FreshnessRecord::new(topic, self.refresh_interval));
        true
    }

    /// Stops tracking `topic`, returning its record.
    pub fn untrack(&mut self, topic: &Topic) -> Option<FreshnessRecord> {
        self.records.remove(topic)
    }

    /// Records an update for `topic` at `at`. Returns `false` if the topic is not tracked.
    ///
    /// Updates older than the current record (a late poll overtaken by a push) are ignored.
    pub fn record_update(&mut self, topic: &Topic, at: UnixNanos) -> bool {
        let Some(record) = self.records.get_mut(topic) else {
            return false;
        };
        if record.last_updated.is_none_or(|last| at > last) {
            record.last_updated = Some(at);
        }
        true
    }

    #[must_use]
    pub fn get(&self, topic: &Topic) -> Option<&FreshnessRecord> {
        self.records.get(topic)
    }

    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.records.contains_key(topic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the tier of every tracked topic at `now`.
    #[must_use]
    pub fn tiers(&self, now: UnixNanos) -> BTreeMap<Topic, FreshnessTier> {
        self.records
            .iter()
            .map(|(topic, record)| (*topic, tier_for(record, now)))
            .collect()
    }

    /// Returns the most recent update across all tracked topics.
    #[must_use]
    pub fn last_update(&self) -> Option<UnixNanos> {
        self.records.values().filter_map(|r| r.last_updated).max()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    const INTERVAL: Duration = Duration::from_millis(300_000);

    fn record_updated_at(millis: u64) -> FreshnessRecord {
        FreshnessRecord {
            topic: Topic::new("berlin"),
            last_updated: Some(UnixNanos::from_millis(millis)),
            refresh_interval: INTERVAL,
        }
    }

    #[fixture]
    fn tracker() -> FreshnessTracker {
        FreshnessTracker::new(INTERVAL)
    }

    #[rstest]
    #[case(0, FreshnessTier::Fresh)]
    #[case(60_000, FreshnessTier::Fresh)]
    #[case(179_999, FreshnessTier::Fresh)]
    #[case(180_000, FreshnessTier::Stale)]
    #[case(240_000, FreshnessTier::Stale)]
    #[case(359_999, FreshnessTier::Stale)]
    #[case(360_000, FreshnessTier::Old)]
    #[case(400_000, FreshnessTier::Old)]
    fn test_tier_for(#[case] elapsed_ms: u64, #[case] expected: FreshnessTier) {
        let record = record_updated_at(1_000_000);
        let now = UnixNanos::from_millis(1_000_000 + elapsed_ms);
        assert_eq!(tier_for(&record, now), expected);
    }

    #[rstest]
    fn test_never_updated_is_old_and_due_now() {
        let record = FreshnessRecord::new(Topic::new("x"), INTERVAL);
        let now = UnixNanos::from_millis(5_000);

        assert_eq!(tier_for(&record, now), FreshnessTier::Old);
        assert_eq!(next_refresh_in(&record, now), Duration::ZERO);
    }

    #[rstest]
    #[case(0, 300_000)]
    #[case(60_000, 240_000)]
    #[case(300_000, 0)]
    #[case(400_000, 0)]
    fn test_next_refresh_in(#[case] elapsed_ms: u64, #[case] expected_ms: u64) {
        let record = record_updated_at(1_000_000);
        let now = UnixNanos::from_millis(1_000_000 + elapsed_ms);
        assert_eq!(
            next_refresh_in(&record, now),
            Duration::from_millis(expected_ms)
        );
    }

    #[rstest]
    fn test_clock_skew_counts_as_zero_elapsed() {
        let record = record_updated_at(10_000);
        let now = UnixNanos::from_millis(9_000);

        assert_eq!(tier_for(&record, now), FreshnessTier::Fresh);
        assert_eq!(next_refresh_in(&record, now), INTERVAL);
    }

    #[rstest]
    fn test_track_and_untrack(mut tracker: FreshnessTracker) {
        let topic = Topic::new("berlin");

        assert!(tracker.track(topic));
        assert!(!tracker.track(topic));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&topic).unwrap().last_updated.is_none());

        assert!(tracker.untrack(&topic).is_some());
        assert!(tracker.is_empty());
        assert!(tracker.untrack(&topic).is_none());
    }

    #[rstest]
    fn test_record_update_requires_tracking(mut tracker: FreshnessTracker) {
        let topic = Topic::new("berlin");
        assert!(!tracker.record_update(&topic, UnixNanos::from_millis(1)));

        tracker.track(topic);
        assert!(tracker.record_update(&topic, UnixNanos::from_millis(1)));
        assert_eq!(
            tracker.get(&topic).unwrap().last_updated,
            Some(UnixNanos::from_millis(1))
        );
    }

    #[rstest]
    fn test_record_update_ignores_older_timestamps(mut tracker: FreshnessTracker) {
        let topic = Topic::new("berlin");
        tracker.track(topic);

        tracker.record_update(&topic, UnixNanos::from_millis(2_000));
        tracker.record_update(&topic, UnixNanos::from_millis(1_000));

        assert_eq!(
            tracker.get(&topic).unwrap().last_updated,
            Some(UnixNanos::from_millis(2_000))
        );
    }

    #[rstest]
    fn test_tiers_and_last_update(mut tracker: FreshnessTracker) {
        let fresh = Topic::new("fresh");
        let never = Topic::new("never");
        let stale = Topic::new("stale");
        for topic in [fresh, never, stale] {
            tracker.track(topic);
        }
        tracker.record_update(&fresh, UnixNanos::from_millis(1_000_000));
        tracker.record_update(&stale, UnixNanos::from_millis(800_000));

        let tiers = tracker.tiers(UnixNanos::from_millis(1_010_000));

        assert_eq!(tiers[&fresh], FreshnessTier::Fresh);
        assert_eq!(tiers[&stale], FreshnessTier::Stale);
        assert_eq!(tiers[&never], FreshnessTier::Old);
        assert_eq!(tracker.last_update(), Some(UnixNanos::from_millis(1_000_000)));
    }
}
