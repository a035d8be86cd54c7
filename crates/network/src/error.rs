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

//! Error types for the transport layer.

use std::time::Duration;

use thiserror::Error;

/// Result type for persistent connection operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for fallback fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised by the persistent (WebSocket) transport.
///
/// Every variant is transient from the connection manager's point of view: it schedules a
/// reconnect rather than surfacing the error to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handshake could not be completed.
    #[error("Connect failed: {0}")]
    Connect(String),
    /// The handshake did not complete within the configured timeout.
    #[error("Connect timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Writing a frame to an open socket failed.
    #[error("Send failed: {0}")]
    Send(String),
    /// The socket was closed by the peer.
    #[error("Connection closed: {0}")]
    Closed(String),
    /// The endpoint URL is invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A configured handshake header is not a valid HTTP header.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;

        match error {
            Error::Url(e) => Self::InvalidUrl(e.to_string()),
            Error::HttpFormat(e) => Self::InvalidUrl(e.to_string()),
            Error::Tls(e) => Self::Tls(e.to_string()),
            Error::ConnectionClosed | Error::AlreadyClosed => Self::Closed(error.to_string()),
            e => Self::Connect(e.to_string()),
        }
    }
}

/// Errors raised by a single fallback fetch.
///
/// A fetch error only skips the current poll tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP error {status}")]
    Http { status: u16 },
    /// The request could not be sent or timed out.
    #[error("Request failed: {0}")]
    Request(String),
    /// The response body was not valid JSON.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The base URL cannot carry the topic path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A configured request header is not a valid HTTP header.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Maps a reqwest error to the matching fetch error.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Request(error.to_string())
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
