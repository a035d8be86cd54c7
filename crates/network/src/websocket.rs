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

//! Persistent connection transport.
//!
//! The connection manager only sees the [`Connector`] and [`Connection`] traits, so the
//! state machine can be driven by an in-memory transport in tests and by
//! [`WebSocketConnector`] in production.

use std::fmt::Debug;

use airfeed_core::consts::AIRFEED_USER_AGENT;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderName, HeaderValue, header::USER_AGENT},
    },
};
use url::Url;

use crate::{
    error::{TransportError, TransportResult},
    tls::install_cryptographic_provider,
};

/// An open persistent connection carrying JSON text frames.
#[async_trait]
pub trait Connection: Send + Debug {
    /// Sends a text frame.
    async fn send_text(&mut self, text: String) -> TransportResult<()>;

    /// Returns the next text payload, `Some(Err)` on a socket error, or `None` once the
    /// peer has closed the connection.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn recv(&mut self) -> Option<TransportResult<String>>;

    /// Closes the connection, ignoring errors.
    async fn close(&mut self);
}

/// Opens persistent connections to a fixed endpoint.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Performs the handshake and returns the open connection.
    async fn connect(&self) -> TransportResult<Box<dyn Connection>>;
}

/// Configuration for [`WebSocketConnector`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// The URL to connect to.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
}

/// A [`Connector`] backed by tokio-tungstenite.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Creates a new [`WebSocketConnector`] instance.
    #[must_use]
    pub const fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_request(&self) -> TransportResult<Request> {
        validate_ws_url(&self.config.url)?;
        let mut request = self.config.url.as_str().into_client_request()?;
        let req_headers = request.headers_mut();
        req_headers.insert(USER_AGENT, HeaderValue::from_static(AIRFEED_USER_AGENT));

        for (key, val) in &self.config.headers {
            let header_name: HeaderName = key
                .parse()
                .map_err(|_| TransportError::InvalidHeader(key.clone()))?;
            let header_value =
                HeaderValue::from_str(val).map_err(|_| TransportError::InvalidHeader(key.clone()))?;
            req_headers.insert(header_name, header_value);
        }

        Ok(request)
    }
}

/// Checks that `url` parses and uses the `ws` or `wss` scheme.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] otherwise.
pub fn validate_ws_url(url: &str) -> TransportResult<()> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(TransportError::InvalidUrl(format!(
            "{url}: unsupported scheme '{scheme}', expected ws or wss"
        ))),
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> TransportResult<Box<dyn Connection>> {
        install_cryptographic_provider();
        let request = self.build_request()?;

        tracing::debug!(url = %self.config.url, "Connecting");
        let (stream, response) = connect_async(request).await?;
        tracing::debug!(status = %response.status(), "Handshake complete");

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

/// A [`Connection`] over a tokio-tungstenite stream.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(WebSocketConnection))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        tracing::trace!("Sending text: {text}");
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => tracing::warn!("Discarding binary frame which is not UTF-8: {e}"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Received close frame");
                    return None;
                }
                // Pongs are queued by tungstenite while reading
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Error closing connection: {e}");
        }
    }
}
