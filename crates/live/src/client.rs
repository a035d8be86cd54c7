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

//! The [`RealtimeClient`] facade.

use std::{sync::Arc, time::Duration};

use airfeed_core::{Clock, LiveClock};
use airfeed_network::{
    http::{HttpTopicFetcher, TopicFetcher},
    mode::ConnectionState,
    websocket::{Connector, WebSocketConfig, WebSocketConnector},
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::RealtimeConfig,
    connection::{ConnectionHandle, ConnectionManager},
    error::RealtimeResult,
    messages::{SubscriptionId, Topic},
    registry::{MessageHandler, SubscriptionRegistry},
    status::{StatusPublisher, StatusSnapshot},
};

/// Keeps subscribed topics up to date over a single shared connection.
///
/// The connection is opened lazily by the first subscription and closed when the last one is
/// removed. Callbacks run on the client's background task.
///
/// Must be created within a Tokio runtime.
#[derive(Debug)]
pub struct RealtimeClient {
    registry: Arc<SubscriptionRegistry>,
    handle: ConnectionHandle,
    status: watch::Receiver<StatusSnapshot>,
    clock: Arc<dyn Clock>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Creates a new [`RealtimeClient`] with the given transports and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: &RealtimeConfig,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn TopicFetcher>,
        clock: Arc<dyn Clock>,
    ) -> RealtimeResult<Self> {
        config.validate()?;
        let policy = config.reconnect_policy()?;

        let (handle, commands) = ConnectionHandle::channel();
        let registry = Arc::new(SubscriptionRegistry::new(
            handle.clone(),
            config.refresh_interval(),
        ));
        let publisher = StatusPublisher::new();
        let status = publisher.subscribe();

        let manager = ConnectionManager::new(
            config,
            policy,
            connector,
            fetcher,
            clock.clone(),
            registry.clone(),
            publisher,
            commands,
        );
        let task = tokio::spawn(manager.run());

        Ok(Self {
            registry,
            handle,
            status,
            clock,
            task: Some(task),
        })
    }

    /// Creates a new [`RealtimeClient`] using WebSocket push and HTTP polling.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the HTTP client cannot be built.
    pub fn from_config(config: &RealtimeConfig) -> RealtimeResult<Self> {
        config.validate()?;

        let connector = WebSocketConnector::new(WebSocketConfig {
            url: config.ws_url.clone(),
            headers: config.headers.clone(),
        });
        let fetcher =
            HttpTopicFetcher::new(&config.http_url, &config.headers, config.poll_timeout())?;

        Self::new(
            config,
            Arc::new(connector),
            Arc::new(fetcher),
            Arc::new(LiveClock::new()),
        )
    }

    /// Registers `handler` for messages on `topic`, connecting if needed.
    pub fn subscribe(&self, topic: impl Into<Topic>, handler: MessageHandler) -> SubscriptionId {
        self.registry.subscribe(topic.into(), handler)
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Returns the latest status snapshot.
    #[must_use]
    pub fn get_status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Returns a receiver notified on every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Asks for an immediate reconnection attempt, resetting the attempt counter.
    ///
    /// Has no effect while connecting or connected.
    pub fn request_retry(&self) {
        self.handle.request_retry();
    }

    /// Returns the time until `topic` is next expected to refresh.
    ///
    /// Returns `None` if the topic has no subscriptions.
    #[must_use]
    pub fn next_refresh_in(&self, topic: impl Into<Topic>) -> Option<Duration> {
        self.registry
            .next_refresh_in(&topic.into(), self.clock.timestamp_ns())
    }

    /// Returns the topics with at least one subscription, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        self.registry.active_topics()
    }

    /// Closes the connection, stops polling and waits for the background task to finish.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.handle.shutdown();
        if let Err(e) = task.await {
            tracing::error!("Connection manager task failed: {e}");
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.handle.shutdown();
        }
    }
}
