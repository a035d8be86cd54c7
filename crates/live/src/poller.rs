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

//! Fallback polling used once reconnection attempts are exhausted.
//!
//! Each polled topic gets its own task which fetches immediately on activation and then on a
//! fixed interval. Results are sent back to the connection manager as [`PollEvent`]s and
//! dispatched through the same path as pushed messages. Every activation is stamped with an
//! epoch so events queued by a task that has since been deactivated can be recognised and
//! discarded.

use std::{sync::Arc, time::Duration};

use ahash::AHashMap;
use airfeed_core::Clock;
use airfeed_network::{error::FetchError, http::TopicFetcher};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::messages::{Topic, TopicMessage};

/// The result of one poll tick.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The fetch succeeded.
    Data(TopicMessage),
    /// The fetch failed, below the degradation threshold.
    Failed { error: FetchError, consecutive: u32 },
    /// The fetch failed and the consecutive failure count reached the threshold.
    Degraded { error: FetchError, consecutive: u32 },
}

/// A poll result for one topic, tagged with the activation it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct PollEvent {
    pub topic: Topic,
    pub epoch: u64,
    pub outcome: PollOutcome,
}

#[derive(Debug)]
struct PollTask {
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Owns the per-topic polling tasks.
#[derive(Debug)]
pub struct FallbackPoller {
    fetcher: Arc<dyn TopicFetcher>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    failure_threshold: u32,
    tx: UnboundedSender<PollEvent>,
    tasks: AHashMap<Topic, PollTask>,
    next_epoch: u64,
}

impl FallbackPoller {
    /// Creates a new [`FallbackPoller`] and the receiver its events are delivered on.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn TopicFetcher>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        failure_threshold: u32,
    ) -> (Self, UnboundedReceiver<PollEvent>) {
        let (tx, rx) = unbounded_channel();
        let poller = Self {
            fetcher,
            clock,
            interval,
            failure_threshold: failure_threshold.max(1),
            tx,
            tasks: AHashMap::new(),
            next_epoch: 0,
        };
        (poller, rx)
    }

    /// Starts polling `topic`. The first fetch happens immediately.
    ///
    /// Returns `false` if the topic is already being polled.
    pub fn activate(&mut self, topic: Topic) -> bool {
        if self.tasks.contains_key(&topic) {
            return false;
        }

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let handle = tokio::spawn(poll_loop(
            topic,
            epoch,
            self.fetcher.clone(),
            self.clock.clone(),
            self.interval,
            self.failure_threshold,
            self.tx.clone(),
        ));

        tracing::info!(%topic, interval_ms = self.interval.as_millis() as u64, "Fallback polling started");
        self.tasks.insert(topic, PollTask { epoch, handle });
        true
    }

    /// Stops polling `topic`. Returns `false` if it was not being polled.
    pub fn deactivate(&mut self, topic: &Topic) -> bool {
        match self.tasks.remove(topic) {
            Some(task) => {
                task.handle.abort();
                tracing::info!(%topic, "Fallback polling stopped");
                true
            }
            None => false,
        }
    }

    /// Stops polling every topic and returns how many were stopped.
    pub fn deactivate_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            task.handle.abort();
        }
        count
    }

    #[must_use]
    pub fn is_active(&self, topic: &Topic) -> bool {
        self.tasks.contains_key(topic)
    }

    /// Returns `true` if `event` was produced by the topic's current activation.
    #[must_use]
    pub fn is_current(&self, event: &PollEvent) -> bool {
        self.tasks
            .get(&event.topic)
            .is_some_and(|task| task.epoch == event.epoch)
    }

    /// Returns the polled topics, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.tasks.keys().copied().collect();
        topics.sort();
        topics
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.deactivate_all();
    }
}

async fn poll_loop(
    topic: Topic,
    epoch: u64,
    fetcher: Arc<dyn TopicFetcher>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    failure_threshold: u32,
    tx: UnboundedSender<PollEvent>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive = 0u32;

    loop {
        timer.tick().await;

        let outcome = match fetcher.fetch(topic.as_str()).await {
            Ok(payload) => {
                consecutive = 0;
                PollOutcome::Data(TopicMessage::poll(topic, payload, clock.timestamp_ns()))
            }
            Err(error) => {
                consecutive = consecutive.saturating_add(1);
                if consecutive >= failure_threshold {
                    PollOutcome::Degraded { error, consecutive }
                } else {
                    PollOutcome::Failed { error, consecutive }
                }
            }
        };

        let event = PollEvent {
            topic,
            epoch,
            outcome,
        };
        if tx.send(event).is_err() {
            tracing::debug!(%topic, "Poll receiver dropped, stopping");
            break;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use airfeed_core::TestClock;
    use airfeed_network::error::FetchResult;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Debug, Default)]
    struct ScriptedFetcher {
        // Consumed front to back; once empty every fetch succeeds
        script: Mutex<VecDeque<FetchResult<Value>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn with_script(script: Vec<FetchResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TopicFetcher for ScriptedFetcher {
        async fn fetch(&self, topic: &str) -> FetchResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"topic": topic})))
        }
    }

    fn poller(
        fetcher: Arc<ScriptedFetcher>,
        threshold: u32,
    ) -> (FallbackPoller, UnboundedReceiver<PollEvent>) {
        FallbackPoller::new(
            fetcher,
            Arc::new(TestClock::new()),
            Duration::from_secs(60),
            threshold,
        )
    }

    fn unavailable() -> FetchResult<Value> {
        Err(FetchError::Http { status: 503 })
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate() {
        let fetcher = ScriptedFetcher::with_script(vec![]);
        let (mut poller, mut rx) = poller(fetcher.clone(), 3);
        let topic = Topic::new("berlin");

        assert!(poller.activate(topic));
        let event = rx.recv().await.unwrap();

        assert_eq!(event.topic, topic);
        assert!(poller.is_current(&event));
        match event.outcome {
            PollOutcome::Data(message) => {
                assert_eq!(message.payload, json!({"topic": "berlin"}));
                assert_eq!(message.source, crate::messages::DeliverySource::Poll);
            }
            other => panic!("Expected data, was {other:?}"),
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let fetcher = ScriptedFetcher::with_script(vec![]);
        let (mut poller, mut rx) = poller(fetcher.clone(), 3);
        poller.activate(Topic::new("berlin"));

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_activate_twice_is_noop() {
        let fetcher = ScriptedFetcher::with_script(vec![]);
        let (mut poller, _rx) = poller(fetcher, 3);
        let topic = Topic::new("berlin");

        assert!(poller.activate(topic));
        assert!(!poller.activate(topic));
        assert_eq!(poller.active_topics(), vec![topic]);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_consecutive_failures_degrade_and_success_resets() {
        let fetcher = ScriptedFetcher::with_script(vec![
            unavailable(),
            unavailable(),
            unavailable(),
            unavailable(),
            Ok(json!({"aqi": 3})),
            unavailable(),
        ]);
        let (mut poller, mut rx) = poller(fetcher, 3);
        poller.activate(Topic::new("berlin"));

        let mut outcomes = Vec::new();
        for _ in 0..6 {
            outcomes.push(rx.recv().await.unwrap().outcome);
        }

        assert!(matches!(outcomes[0], PollOutcome::Failed { consecutive: 1, .. }));
        assert!(matches!(outcomes[1], PollOutcome::Failed { consecutive: 2, .. }));
        assert!(matches!(outcomes[2], PollOutcome::Degraded { consecutive: 3, .. }));
        assert!(matches!(outcomes[3], PollOutcome::Degraded { consecutive: 4, .. }));
        assert!(matches!(outcomes[4], PollOutcome::Data(_)));
        assert!(matches!(outcomes[5], PollOutcome::Failed { consecutive: 1, .. }));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_deactivate_marks_queued_events_stale() {
        let fetcher = ScriptedFetcher::with_script(vec![]);
        let (mut poller, mut rx) = poller(fetcher.clone(), 3);
        let topic = Topic::new("berlin");
        poller.activate(topic);

        let stale = rx.recv().await.unwrap();
        assert!(poller.deactivate(&topic));
        assert!(!poller.deactivate(&topic));
        assert!(!poller.is_current(&stale));

        poller.activate(topic);
        let fresh = rx.recv().await.unwrap();
        assert!(poller.is_current(&fresh));
        assert!(!poller.is_current(&stale));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_deactivate_all_stops_fetching() {
        let fetcher = ScriptedFetcher::with_script(vec![]);
        let (mut poller, mut rx) = poller(fetcher.clone(), 3);
        poller.activate(Topic::new("berlin"));
        poller.activate(Topic::new("oslo"));
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        assert_eq!(poller.deactivate_all(), 2);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());
    }
}
