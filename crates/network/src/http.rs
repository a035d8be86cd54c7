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

//! One-shot topic fetches used by fallback polling.
//!
//! The contract is `GET {base_url}/topics/{topic}/current`, answering with the same JSON
//! shape as a pushed `data` frame's payload.

use std::{fmt::Debug, time::Duration};

use airfeed_core::consts::AIRFEED_USER_AGENT;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::{
    error::{FetchError, FetchResult},
    tls::install_cryptographic_provider,
};

/// Fetches the current payload for a topic.
#[async_trait]
pub trait TopicFetcher: Send + Sync + Debug {
    /// Fetches the current payload for `topic`.
    async fn fetch(&self, topic: &str) -> FetchResult<serde_json::Value>;
}

/// A [`TopicFetcher`] backed by reqwest.
#[derive(Clone, Debug)]
pub struct HttpTopicFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTopicFetcher {
    /// Creates a new [`HttpTopicFetcher`] instance.
    ///
    /// `timeout` bounds each whole request, so a hung server fails the tick instead of
    /// stalling the poll loop.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` cannot be parsed or cannot carry a path, or if a header is
    /// invalid.
    pub fn new(
        base_url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> FetchResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }

        let mut header_map = HeaderMap::new();
        for (key, val) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(key.clone()))?;
            let value =
                HeaderValue::from_str(val).map_err(|_| FetchError::InvalidHeader(key.clone()))?;
            header_map.insert(name, value);
        }

        install_cryptographic_provider();
        let client = reqwest::Client::builder()
            .user_agent(AIRFEED_USER_AGENT)
            .default_headers(header_map)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::from_reqwest(&e))?;

        Ok(Self { client, base_url })
    }

    /// Returns the URL polled for `topic`.
    ///
    /// The topic is percent-encoded as a single path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry path segments.
    pub fn topic_url(&self, topic: &str) -> FetchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["topics", topic, "current"]);
        Ok(url)
    }
}

#[async_trait]
impl TopicFetcher for HttpTopicFetcher {
    async fn fetch(&self, topic: &str) -> FetchResult<serde_json::Value> {
        let url = self.topic_url(topic)?;
        tracing::trace!(%url, "Fetching topic");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fetcher(base_url: &str) -> HttpTopicFetcher {
        HttpTopicFetcher::new(base_url, &[], Duration::from_secs(1)).unwrap()
    }

    #[rstest]
    #[case("http://localhost:8080", "berlin", "http://localhost:8080/topics/berlin/current")]
    #[case("http://localhost:8080/", "berlin", "http://localhost:8080/topics/berlin/current")]
    #[case("http://localhost/api/v1", "berlin", "http://localhost/api/v1/topics/berlin/current")]
    #[case("http://localhost", "new york", "http://localhost/topics/new%20york/current")]
    #[case("http://localhost", "a/b", "http://localhost/topics/a%2Fb/current")]
    fn test_topic_url(#[case] base: &str, #[case] topic: &str, #[case] expected: &str) {
        let url = fetcher(base).topic_url(topic).unwrap();
        assert_eq!(url.as_str(), expected);
    }

    #[rstest]
    #[case("not a url")]
    #[case("mailto:ops@example.com")]
    fn test_invalid_base_url(#[case] base: &str) {
        let result = HttpTopicFetcher::new(base, &[], Duration::from_secs(1));
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[rstest]
    fn test_invalid_header() {
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let result = HttpTopicFetcher::new("http://localhost", &headers, Duration::from_secs(1));
        assert!(matches!(result, Err(FetchError::InvalidHeader(_))));
    }
}
