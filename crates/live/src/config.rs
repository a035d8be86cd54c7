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

//! Configuration for the real-time client.
//!
//! Every field has a default, so a TOML file only needs the values it overrides:
//!
//! ```toml
//! ws_url = "wss://api.example.com/realtime"
//! http_url = "https://api.example.com"
//!
//! [reconnect]
//! max_attempts = 8
//! ```

use std::{path::Path, time::Duration};

use airfeed_network::{
    backoff::{
        DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
        ReconnectPolicy,
    },
    websocket::validate_ws_url,
};
use serde::{Deserialize, Serialize};

use crate::error::{RealtimeError, RealtimeResult};

/// Configuration for reconnection backoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// The delay (milliseconds) before the first retry.
    pub base_delay_ms: u64,
    /// The cap (milliseconds) on any retry delay.
    pub max_delay_ms: u64,
    /// The number of failed retries after which the client falls back to polling.
    pub max_attempts: u32,
    /// The jitter ratio applied to each delay, in `[0, 1)`.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    /// Creates a new default [`ReconnectConfig`] instance.
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

/// Configuration for [`RealtimeClient`](crate::RealtimeClient) instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RealtimeConfig {
    /// The WebSocket endpoint for push delivery.
    pub ws_url: String,
    /// The HTTP base URL for fallback polling.
    pub http_url: String,
    /// Extra headers sent with the handshake and every poll request.
    pub headers: Vec<(String, String)>,
    /// The handshake timeout (milliseconds).
    pub connect_timeout_ms: u64,
    /// The interval (milliseconds) between fallback polls of a topic.
    pub poll_interval_ms: u64,
    /// The timeout (milliseconds) for a single fallback poll request.
    pub poll_timeout_ms: u64,
    /// The number of consecutive poll failures after which a topic is reported degraded.
    pub poll_failure_threshold: u32,
    /// The expected refresh interval (milliseconds) used for freshness tiers.
    pub refresh_interval_ms: u64,
    /// How often (milliseconds) freshness tiers are re-evaluated.
    pub freshness_check_interval_ms: u64,
    /// The reconnection backoff settings.
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    /// Creates a new default [`RealtimeConfig`] instance.
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_string(),
            http_url: "http://localhost:8080".to_string(),
            headers: Vec::new(),
            connect_timeout_ms: 10_000,
            poll_interval_ms: 60_000,
            poll_timeout_ms: 10_000,
            poll_failure_threshold: 3,
            refresh_interval_ms: 300_000,
            freshness_check_interval_ms: 1_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Parses a configuration from TOML and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or any value is invalid.
    pub fn from_toml_str(text: &str) -> RealtimeResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or on any [`Self::from_toml_str`] error.
    pub fn from_toml_file(path: impl AsRef<Path>) -> RealtimeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RealtimeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> RealtimeResult<String> {
        toml::to_string_pretty(self).map_err(|e| RealtimeError::Config(e.to_string()))
    }

    /// Checks that every interval is non-zero and the backoff settings are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Validation`] naming the first invalid field.
    pub fn validate(&self) -> RealtimeResult<()> {
        let positive = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("freshness_check_interval_ms", self.freshness_check_interval_ms),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RealtimeError::Validation(format!("{name} must be positive")));
            }
        }

        if self.poll_failure_threshold == 0 {
            return Err(RealtimeError::Validation(
                "poll_failure_threshold must be positive".to_string(),
            ));
        }

        validate_ws_url(&self.ws_url)
            .map_err(|e| RealtimeError::Validation(format!("ws_url: {e}")))?;

        self.reconnect_policy().map(|_| ())
    }

    /// Builds the reconnection policy described by [`Self::reconnect`].
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Validation`] if the backoff settings are inconsistent.
    pub fn reconnect_policy(&self) -> RealtimeResult<ReconnectPolicy> {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect.base_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.max_attempts,
            self.reconnect.jitter,
        )
        .map_err(|e| RealtimeError::Validation(format!("reconnect: {e}")))
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    #[must_use]
    pub const fn freshness_check_interval(&self) -> Duration {
        Duration::from_millis(self.freshness_check_interval_ms)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_defaults() {
        let config = RealtimeConfig::default();

        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.poll_failure_threshold, 3);
        assert_eq!(config.reconnect_policy().unwrap(), ReconnectPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[rstest]
    fn test_partial_toml_keeps_defaults() {
        let config = RealtimeConfig::from_toml_str(
            r#"
            ws_url = "wss://example.com/realtime"
            headers = [["x-api-key", "secret"]]

            [reconnect]
            max_attempts = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.ws_url, "wss://example.com/realtime");
        assert_eq!(
            config.headers,
            vec![("x-api-key".to_string(), "secret".to_string())]
        );
        assert_eq!(config.reconnect.max_attempts, 8);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.http_url, RealtimeConfig::default().http_url);
    }

    #[rstest]
    fn test_toml_string_parses_back() {
        let config = RealtimeConfig {
            poll_interval_ms: 5_000,
            ..Default::default()
        };

        let text = config.to_toml_string().unwrap();

        assert_eq!(RealtimeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[rstest]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval_ms = 120000").unwrap();

        let config = RealtimeConfig::from_toml_file(file.path()).unwrap();

        assert_eq!(config.refresh_interval(), Duration::from_secs(120));
    }

    #[rstest]
    fn test_from_missing_file() {
        let result = RealtimeConfig::from_toml_file("/nonexistent/airfeed.toml");
        assert!(matches!(result, Err(RealtimeError::Config(_))));
    }

    #[rstest]
    #[case("poll_interval_ms = -1")]
    #[case("unknown_field = true")]
    #[case("[reconnect]\nfactor = 3.0")]
    fn test_malformed_toml(#[case] text: &str) {
        let result = RealtimeConfig::from_toml_str(text);
        assert!(matches!(result, Err(RealtimeError::Config(_))), "{result:?}");
    }

    #[rstest]
    #[case("poll_interval_ms = 0", "poll_interval_ms")]
    #[case("connect_timeout_ms = 0", "connect_timeout_ms")]
    #[case("poll_failure_threshold = 0", "poll_failure_threshold")]
    #[case("[reconnect]\nmax_attempts = 0", "max_attempts")]
    #[case("[reconnect]\nmax_delay_ms = 10", "max_delay")]
    #[case("[reconnect]\njitter = 1.5", "jitter")]
    #[case("ws_url = \"http://example.com/realtime\"", "ws_url")]
    #[case("ws_url = \"not a url\"", "ws_url")]
    fn test_invalid_values(#[case] text: &str, #[case] field: &str) {
        let result = RealtimeConfig::from_toml_str(text);
        match result {
            Err(RealtimeError::Validation(msg)) => assert!(msg.contains(field), "{msg}"),
            other => panic!("Expected validation error, was {other:?}"),
        }
    }
}
