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

//! A `UnixNanos` type for timestamps in nanoseconds since the UNIX epoch.
//!
//! Used for every receive time and freshness calculation in the workspace. Elapsed-time
//! helpers return [`Duration`] and saturate at zero, so a timestamp observed "in the future"
//! (clock skew between a server and this host) never produces a negative age.

use std::{
    fmt::Display,
    ops::{Add, Sub},
    str::FromStr,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a timestamp in nanoseconds since the UNIX epoch.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixNanos(u64);

impl UnixNanos {
    /// Creates a new [`UnixNanos`] instance.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Creates a new [`UnixNanos`] from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns `true` if the value of this instance is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the underlying value as `u64`.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp truncated to whole milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Converts the underlying value to a datetime (UTC).
    ///
    /// Values beyond `i64::MAX` nanoseconds (year 2262) saturate.
    #[must_use]
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        let nanos = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::from_timestamp_nanos(nanos)
    }

    /// Converts the underlying value to an ISO 8601 (RFC 3339) string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime_utc().to_rfc3339()
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub const fn elapsed_since(&self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Returns `self` advanced by `duration`, clamped to `u64::MAX`.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns `self` moved back by `duration`, clamped to zero.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }
}

impl From<u64> for UnixNanos {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<UnixNanos> for u64 {
    fn from(value: UnixNanos) -> Self {
        value.0
    }
}

/// Error returned when a string is not a valid [`UnixNanos`] representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseUnixNanosError {
    /// Neither an integer nanosecond count nor an RFC 3339 timestamp.
    #[error("invalid timestamp format: {0}")]
    InvalidFormat(String),
    /// A valid RFC 3339 timestamp earlier than 1970-01-01T00:00:00Z.
    #[error("timestamp before the UNIX epoch: {0}")]
    BeforeEpoch(String),
}

impl FromStr for UnixNanos {
    type Err = ParseUnixNanosError;

    /// Parses either an integer nanosecond count or an RFC 3339 timestamp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<u64>() {
            return Ok(Self(value));
        }

        let datetime = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseUnixNanosError::InvalidFormat(s.to_string()))?;
        let nanos = datetime
            .timestamp_nanos_opt()
            .ok_or_else(|| ParseUnixNanosError::InvalidFormat(s.to_string()))?;

        u64::try_from(nanos)
            .map(Self)
            .map_err(|_| ParseUnixNanosError::BeforeEpoch(s.to_string()))
    }
}

impl From<DateTime<Utc>> for UnixNanos {
    fn from(value: DateTime<Utc>) -> Self {
        let nanos = value.timestamp_nanos_opt().unwrap_or_default();
        Self(u64::try_from(nanos).unwrap_or_default())
    }
}

impl Add<Duration> for UnixNanos {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for UnixNanos {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Display for UnixNanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
