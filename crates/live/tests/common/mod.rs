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

//! Scripted transports shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use airfeed_core::TestClock;
use airfeed_live::{RealtimeClient, RealtimeConfig, config::ReconnectConfig};
use airfeed_network::{
    error::{FetchError, FetchResult, TransportError, TransportResult},
    http::TopicFetcher,
    websocket::{Connection, Connector},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub const WAIT: Duration = Duration::from_secs(600);

/// How the next connect attempt behaves.
#[derive(Clone, Debug)]
pub enum ConnectOutcome {
    Accept,
    Refuse(String),
    Hang,
}

/// The test's end of one accepted mock connection.
#[derive(Debug)]
pub struct MockPeer {
    inbound: Option<UnboundedSender<TransportResult<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockPeer {
    /// Pushes a text frame to the client. Ignored once the client has dropped the connection.
    pub fn push(&self, text: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(text.into()));
        }
    }

    pub fn push_data(&self, topic: &str, payload: Value) {
        self.push(json!({"type": "data", "topic": topic, "payload": payload}).to_string());
    }

    pub fn fail(&self, error: TransportError) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(error));
        }
    }

    /// Closes the connection from the server side.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns `true` if the client closed the connection.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockConnection {
    inbound: UnboundedReceiver<TransportResult<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Send("connection closed".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportResult<String>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A [`Connector`] whose attempts follow a script, then a default outcome.
#[derive(Debug)]
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    default: Mutex<ConnectOutcome>,
    attempts: AtomicUsize,
    peers: UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new(default: ConnectOutcome) -> (Arc<Self>, UnboundedReceiver<MockPeer>) {
        Self::scripted(Vec::new(), default)
    }

    pub fn scripted(
        script: Vec<ConnectOutcome>,
        default: ConnectOutcome,
    ) -> (Arc<Self>, UnboundedReceiver<MockPeer>) {
        let (peers, rx) = unbounded_channel();
        let connector = Self {
            script: Mutex::new(script.into()),
            default: Mutex::new(default),
            attempts: AtomicUsize::new(0),
            peers,
        };
        (Arc::new(connector), rx)
    }

    pub fn set_default(&self, outcome: ConnectOutcome) {
        *self.default.lock().unwrap() = outcome;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> TransportResult<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.lock().unwrap().clone());

        match outcome {
            ConnectOutcome::Accept => {
                let (tx, rx) = unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.peers.send(MockPeer {
                    inbound: Some(tx),
                    sent: sent.clone(),
                    closed: closed.clone(),
                });
                Ok(Box::new(MockConnection {
                    inbound: rx,
                    sent,
                    closed,
                }))
            }
            ConnectOutcome::Refuse(reason) => Err(TransportError::Connect(reason)),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

/// A [`TopicFetcher`] returning a configurable result and counting calls per topic.
#[derive(Debug)]
pub struct MockFetcher {
    result: Mutex<FetchResult<Value>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(result: FetchResult<Value>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(result),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(Err(FetchError::Http { status: 503 }))
    }

    pub fn set_result(&self, result: FetchResult<Value>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, topic: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == topic)
            .count()
    }
}

#[async_trait]
impl TopicFetcher for MockFetcher {
    async fn fetch(&self, topic: &str) -> FetchResult<Value> {
        self.calls.lock().unwrap().push(topic.to_string());
        self.result.lock().unwrap().clone()
    }
}

pub fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        connect_timeout_ms: 10_000,
        poll_interval_ms: 60_000,
        poll_failure_threshold: 3,
        refresh_interval_ms: 300_000,
        freshness_check_interval_ms: 1_000,
        reconnect: ReconnectConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter: 0.2,
        },
        ..RealtimeConfig::default()
    }
}

pub fn test_client(
    connector: Arc<MockConnector>,
    fetcher: Arc<MockFetcher>,
) -> (RealtimeClient, Arc<TestClock>) {
    test_client_with(&test_config(), connector, fetcher)
}

pub fn test_client_with(
    config: &RealtimeConfig,
    connector: Arc<MockConnector>,
    fetcher: Arc<MockFetcher>,
) -> (RealtimeClient, Arc<TestClock>) {
    let clock = Arc::new(TestClock::new());
    let client = RealtimeClient::new(config, connector, fetcher, clock.clone()).unwrap();
    (client, clock)
}

/// Waits for the next accepted connection.
pub async fn next_peer(peers: &mut UnboundedReceiver<MockPeer>) -> MockPeer {
    tokio::time::timeout(WAIT, peers.recv())
        .await
        .expect("Timeout waiting for a connection")
        .expect("Connector dropped")
}
