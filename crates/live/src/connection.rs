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

//! The connection manager: a single task owning the persistent connection.
//!
//! All connection state lives inside [`ConnectionManager::run`] and is only touched by that task.
//! Other components talk to it through a cloneable [`ConnectionHandle`], which enqueues
//! [`Command`]s and reads the current [`ConnectionState`] from an atomic mirror.
//!
//! State transitions:
//!
//! ```text
//! Idle --ensure_connected--> Connecting --ok--> Connected
//!                            Connecting --err/timeout--> Reconnecting | Failed
//! Connected --closed/error--> Reconnecting | Failed
//! Reconnecting --delay elapsed--> Connecting
//! Reconnecting | Failed --retry--> Connecting
//! any --teardown--> Idle
//! ```
//!
//! Entering `Failed` starts fallback polling for every active topic. Polling stops the next
//! time a connection is established.

use std::{
    collections::BTreeSet,
    fmt::Debug,
    future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use airfeed_core::{Clock, UnixNanos};
use airfeed_network::{
    backoff::ReconnectPolicy,
    error::{TransportError, TransportResult},
    http::TopicFetcher,
    mode::ConnectionState,
    websocket::{Connection, Connector},
};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel},
    time::{MissedTickBehavior, Sleep},
};

use crate::{
    config::RealtimeConfig,
    messages::{FrameType, SubscriptionIntent, Topic, TopicMessage, WireFrame},
    poller::{FallbackPoller, PollEvent, PollOutcome},
    registry::SubscriptionRegistry,
    status::{StatusPublisher, StatusSnapshot},
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type ConnectFuture = BoxFuture<'static, TransportResult<Box<dyn Connection>>>;

/// A request for the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Connect if currently idle.
    EnsureConnected,
    /// Reflect a subscription change on the wire, or buffer it while disconnected.
    Send(SubscriptionIntent),
    /// Retry immediately, resetting the attempt counter.
    RetryNow,
    /// Close the connection and return to idle.
    Teardown,
    /// Tear down and stop the manager task.
    Shutdown,
}

/// A cloneable handle for sending [`Command`]s to the connection manager.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    tx: UnboundedSender<Command>,
    state: Arc<AtomicU8>,
}

/// The manager's end of a [`ConnectionHandle`] channel.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: UnboundedReceiver<Command>,
    state: Arc<AtomicU8>,
}

impl ConnectionHandle {
    /// Creates a connected handle and receiver pair.
    #[must_use]
    pub fn channel() -> (Self, CommandReceiver) {
        let (tx, rx) = unbounded_channel();
        let state = Arc::new(AtomicU8::new(ConnectionState::Idle.as_u8()));
        let handle = Self {
            tx,
            state: state.clone(),
        };
        (handle, CommandReceiver { rx, state })
    }

    pub fn ensure_connected(&self) {
        self.command(Command::EnsureConnected);
    }

    pub fn send(&self, intent: SubscriptionIntent) {
        self.command(Command::Send(intent));
    }

    pub fn request_retry(&self) {
        self.command(Command::RetryNow);
    }

    pub fn teardown(&self) {
        self.command(Command::Teardown);
    }

    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Returns the manager's current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_atomic(&self.state)
    }

    /// Returns `true` if the manager task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.tx.send(command) {
            tracing::debug!("Connection manager stopped, dropping {:?}", e.0);
        }
    }
}

impl CommandReceiver {
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Receives a command without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is empty or every handle has been dropped.
    pub fn try_recv(&mut self) -> Result<Command, TryRecvError> {
        self.rx.try_recv()
    }

    fn store_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Bookkeeping for reconnection attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconnectState {
    /// Consecutive attempts since the last successful connection.
    pub attempts: u32,
    pub last_attempt_at: Option<UnixNanos>,
}

/// Owns the connection, the fallback poller and the reconnection schedule.
///
/// Construct with [`ConnectionManager::new`] and drive with [`ConnectionManager::run`] on its
/// own task.
pub struct ConnectionManager {
    state: ConnectionState,
    reconnect: ReconnectState,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    freshness_check_interval: Duration,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    registry: Arc<SubscriptionRegistry>,
    status: StatusPublisher,
    commands: CommandReceiver,
    poller: FallbackPoller,
    poll_rx: UnboundedReceiver<PollEvent>,
    connection: Option<Box<dyn Connection>>,
    pending_connect: Option<ConnectFuture>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    // Intents received while disconnected, superseded by resubscription on connect
    buffered: Vec<SubscriptionIntent>,
    // Topics currently subscribed on the live connection
    wire_topics: BTreeSet<Topic>,
    polling: bool,
    connection_error: Option<String>,
    poll_degraded: Option<(Topic, String)>,
}

impl Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ConnectionManager))
            .field("state", &self.state)
            .field("reconnect", &self.reconnect)
            .field("policy", &self.policy)
            .field("connector", &self.connector)
            .field("connected", &self.connection.is_some())
            .field("connect_pending", &self.pending_connect.is_some())
            .field("retry_scheduled", &self.retry_timer.is_some())
            .field("wire_topics", &self.wire_topics)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a new [`ConnectionManager`] instance.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: &RealtimeConfig,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn TopicFetcher>,
        clock: Arc<dyn Clock>,
        registry: Arc<SubscriptionRegistry>,
        status: StatusPublisher,
        commands: CommandReceiver,
    ) -> Self {
        let (poller, poll_rx) = FallbackPoller::new(
            fetcher,
            clock.clone(),
            config.poll_interval(),
            config.poll_failure_threshold,
        );

        Self {
            state: ConnectionState::Idle,
            reconnect: ReconnectState::default(),
            policy,
            connect_timeout: config.connect_timeout(),
            freshness_check_interval: config.freshness_check_interval(),
            connector,
            clock,
            registry,
            status,
            commands,
            poller,
            poll_rx,
            connection: None,
            pending_connect: None,
            retry_timer: None,
            buffered: Vec::new(),
            wire_topics: BTreeSet::new(),
            polling: false,
            connection_error: None,
            poll_degraded: None,
        }
    }

    /// Runs the manager until [`Command::Shutdown`] is received or every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("Connection manager started");

        let mut freshness_timer = tokio::time::interval(self.freshness_check_interval);
        freshness_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.teardown("all handles dropped").await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                result = poll_connect(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.on_connect_result(result).await;
                }
                frame = recv_frame(&mut self.connection) => self.on_frame(frame),
                () = wait_retry(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    self.on_retry_timer();
                }
                Some(event) = self.poll_rx.recv() => self.on_poll_event(event),
                _ = freshness_timer.tick() => self.publish_status(),
            }
        }

        tracing::debug!("Connection manager stopped");
    }

    // Returns false once the manager should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::EnsureConnected => {
                if self.state.is_idle() {
                    self.start_connect();
                }
            }
            Command::Send(intent) => self.handle_intent(intent).await,
            Command::RetryNow => self.retry_now(),
            Command::Teardown => self.teardown("no active topics").await,
            Command::Shutdown => {
                self.teardown("shutdown").await;
                return false;
            }
        }
        true
    }

    async fn handle_intent(&mut self, intent: SubscriptionIntent) {
        if self.state.is_connected() {
            self.send_intent(intent).await;
            self.publish_status();
            return;
        }

        if self.polling {
            match intent {
                SubscriptionIntent::Subscribe(topic) => {
                    self.poller.activate(topic);
                }
                SubscriptionIntent::Unsubscribe(topic) => {
                    self.poller.deactivate(&topic);
                    if self.poll_degraded.as_ref().is_some_and(|(t, _)| *t == topic) {
                        self.poll_degraded = None;
                    }
                }
            }
        }

        tracing::debug!(state = %self.state, "Buffering {intent}");
        self.buffered.push(intent);
        self.publish_status();
    }

    async fn send_intent(&mut self, intent: SubscriptionIntent) {
        let changed = match intent {
            SubscriptionIntent::Subscribe(topic) => self.wire_topics.insert(topic),
            SubscriptionIntent::Unsubscribe(topic) => self.wire_topics.remove(&topic),
        };
        if !changed {
            tracing::trace!("Skipping {intent}, already reflected on the connection");
            return;
        }
        self.send_text(intent.to_json()).await;
    }

    async fn send_text(&mut self, text: String) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        tracing::trace!("Sending {text}");
        let result = connection.send_text(text).await;
        if let Err(e) = result {
            tracing::warn!("Send failed: {e}");
            self.on_connection_lost(&e.to_string());
        }
    }

    fn retry_now(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::debug!("Retry requested while {}, ignoring", self.state);
            }
            ConnectionState::Idle => {
                if !self.registry.is_empty() {
                    self.start_connect();
                }
            }
            ConnectionState::Reconnecting | ConnectionState::Failed => {
                tracing::info!("Manual retry requested");
                self.reconnect.attempts = 0;
                self.start_connect();
            }
        }
    }

    fn start_connect(&mut self) {
        self.retry_timer = None;

        let connector = self.connector.clone();
        let timeout = self.connect_timeout;
        self.pending_connect = Some(Box::pin(async move {
            tokio::time::timeout(timeout, connector.connect())
                .await
                .unwrap_or(Err(TransportError::Timeout(timeout)))
        }));

        self.reconnect.last_attempt_at = Some(self.clock.timestamp_ns());
        self.set_state(ConnectionState::Connecting);
    }

    async fn on_connect_result(&mut self, result: TransportResult<Box<dyn Connection>>) {
        match result {
            Ok(connection) => self.on_connected(connection).await,
            Err(e) => {
                tracing::warn!(attempt = self.reconnect.attempts, "Connect failed: {e}");
                self.on_connection_lost(&e.to_string());
            }
        }
    }

    async fn on_connected(&mut self, connection: Box<dyn Connection>) {
        tracing::info!("Connected");

        self.connection = Some(connection);
        self.reconnect.attempts = 0;
        self.connection_error = None;
        self.poll_degraded = None;
        self.polling = false;

        let stopped = self.poller.deactivate_all();
        if stopped > 0 {
            tracing::info!("Stopped fallback polling for {stopped} topic(s)");
        }
        if !self.buffered.is_empty() {
            tracing::debug!(
                "Discarding {} buffered intent(s), superseded by resubscription",
                self.buffered.len()
            );
            self.buffered.clear();
        }

        self.set_state(ConnectionState::Connected);

        self.wire_topics.clear();
        for topic in self.registry.active_topics() {
            if !self.state.is_connected() {
                break;
            }
            self.send_intent(SubscriptionIntent::Subscribe(topic)).await;
        }
    }

    fn on_frame(&mut self, frame: Option<TransportResult<String>>) {
        match frame {
            Some(Ok(text)) => self.handle_text(&text),
            Some(Err(e)) => {
                tracing::warn!("Connection error: {e}");
                self.on_connection_lost(&e.to_string());
            }
            None => {
                tracing::warn!("Connection closed by server");
                self.on_connection_lost("closed by server");
            }
        }
    }

    fn handle_text(&self, text: &str) {
        tracing::trace!("Received {text}");

        let frame = match WireFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Discarding frame: {e}");
                return;
            }
        };

        match frame.frame_type {
            FrameType::Data => {
                let message = TopicMessage::push(
                    frame.topic,
                    frame.payload.unwrap_or(Value::Null),
                    self.clock.timestamp_ns(),
                    frame.timestamp,
                );
                self.registry.dispatch(&message);
                self.publish_status();
            }
            FrameType::Error => {
                tracing::warn!(
                    topic = %frame.topic,
                    "Server error: {}",
                    frame.error_message().unwrap_or("<no message>")
                );
            }
            FrameType::Subscribe | FrameType::Unsubscribe => {
                tracing::debug!(topic = %frame.topic, "Server acknowledged {}", frame.frame_type);
            }
        }
    }

    fn on_connection_lost(&mut self, reason: &str) {
        self.connection = None;
        self.pending_connect = None;
        self.wire_topics.clear();

        if self.policy.should_give_up(self.reconnect.attempts) {
            self.enter_failed(reason);
            return;
        }

        let delay = self.policy.jittered_delay_for(self.reconnect.attempts);
        tracing::warn!(
            attempt = self.reconnect.attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Connection lost ({reason}), scheduling reconnect"
        );
        self.retry_timer = Some(Box::pin(tokio::time::sleep(delay)));
        self.set_state(ConnectionState::Reconnecting);
    }

    fn on_retry_timer(&mut self) {
        self.reconnect.attempts = self.reconnect.attempts.saturating_add(1);
        self.start_connect();
    }

    fn enter_failed(&mut self, reason: &str) {
        let error = format!(
            "Reconnection failed after {} attempts: {reason}",
            self.reconnect.attempts
        );
        tracing::error!("{error}, falling back to polling");

        self.connection_error = Some(error);
        self.polling = true;
        for topic in self.registry.active_topics() {
            self.poller.activate(topic);
        }
        self.set_state(ConnectionState::Failed);
    }

    fn on_poll_event(&mut self, event: PollEvent) {
        if !self.poller.is_current(&event) {
            tracing::trace!(topic = %event.topic, "Discarding poll event from a stopped poller");
            return;
        }

        let topic = event.topic;
        match event.outcome {
            PollOutcome::Data(message) => {
                if self.poll_degraded.as_ref().is_some_and(|(t, _)| *t == topic) {
                    tracing::info!(%topic, "Polling recovered");
                    self.poll_degraded = None;
                }
                self.registry.dispatch(&message);
            }
            PollOutcome::Failed { error, consecutive } => {
                tracing::debug!(%topic, consecutive, "Poll failed: {error}");
            }
            PollOutcome::Degraded { error, consecutive } => {
                tracing::warn!(%topic, consecutive, "Polling degraded: {error}");
                self.poll_degraded = Some((
                    topic,
                    format!("Polling {topic} failed {consecutive} consecutive times: {error}"),
                ));
            }
        }
        self.publish_status();
    }

    async fn teardown(&mut self, reason: &str) {
        self.pending_connect = None;
        self.retry_timer = None;

        if let Some(mut connection) = self.connection.take()
            && tokio::time::timeout(CLOSE_TIMEOUT, connection.close())
                .await
                .is_err()
        {
            tracing::warn!("Timeout closing connection");
        }

        self.poller.deactivate_all();
        self.polling = false;
        self.buffered.clear();
        self.wire_topics.clear();
        self.reconnect = ReconnectState::default();
        self.connection_error = None;
        self.poll_degraded = None;

        if !self.state.is_idle() {
            tracing::debug!("Tearing down connection: {reason}");
        }
        self.set_state(ConnectionState::Idle);
    }

    fn last_error(&self) -> Option<String> {
        self.poll_degraded
            .as_ref()
            .map(|(_, error)| error.clone())
            .or_else(|| self.connection_error.clone())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::info!("Connection state {} -> {state}", self.state);
        }
        self.state = state;
        self.commands.store_state(state);
        self.publish_status();
    }

    fn publish_status(&self) {
        let now = self.clock.timestamp_ns();
        self.status.publish(StatusSnapshot::new(
            self.state,
            self.reconnect.attempts,
            self.last_error(),
            self.registry.last_update(),
            self.registry.freshness_tiers(now),
        )
        .with_polling(self.polling));
    }
}

async fn poll_connect(
    pending: &mut Option<ConnectFuture>,
) -> TransportResult<Box<dyn Connection>> {
    match pending {
        Some(connect) => connect.await,
        None => future::pending().await,
    }
}

async fn recv_frame(
    connection: &mut Option<Box<dyn Connection>>,
) -> Option<TransportResult<String>> {
    match connection {
        Some(connection) => connection.recv().await,
        None => future::pending().await,
    }
}

async fn wait_retry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
