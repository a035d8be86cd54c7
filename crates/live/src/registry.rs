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

//! Multiplexes topic subscriptions over the single persistent connection.
//!
//! The registry maps topics to consumer callbacks. The first subscription for a topic sends a
//! subscribe intent and asks the connection manager to connect; removing the last one sends an
//! unsubscribe intent, and removing the last topic tears the connection down. Intents are
//! enqueued while the registry lock is held, so the manager sees them in registry order.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use ahash::AHashMap;
use airfeed_core::{MUTEX_POISONED, UnixNanos};

use crate::{
    connection::ConnectionHandle,
    freshness::{FreshnessRecord, FreshnessTier, FreshnessTracker, next_refresh_in},
    messages::{SubscriptionId, SubscriptionIntent, Topic, TopicMessage},
};

/// Callback type for delivered topic messages.
///
/// Invoked on the connection manager's task, so it should return quickly.
pub type MessageHandler = Arc<dyn Fn(&TopicMessage) + Send + Sync>;

/// Creates a channel-based message handler.
///
/// Returns a tuple containing the message handler and a receiver for messages.
#[must_use]
pub fn channel_message_handler() -> (
    MessageHandler,
    tokio::sync::mpsc::UnboundedReceiver<TopicMessage>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = Arc::new(move |msg: &TopicMessage| {
        if let Err(e) = tx.send(msg.clone()) {
            tracing::debug!("Failed to send message to channel: {e}");
        }
    });
    (handler, rx)
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: MessageHandler,
    // Cleared by unsubscribe before it returns, checked before every invocation
    active: Arc<AtomicBool>,
}

impl Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Registration))
            .field("id", &self.id)
            .field("handler", &"<function>")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Debug)]
struct RegistryState {
    // Registration order is preserved per topic
    topics: AHashMap<Topic, Vec<Registration>>,
    index: AHashMap<SubscriptionId, Topic>,
    freshness: FreshnessTracker,
}

/// Maps topics to consumer callbacks and dispatches inbound messages to them.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    connection: ConnectionHandle,
}

impl SubscriptionRegistry {
    /// Creates a new [`SubscriptionRegistry`] instance.
    #[must_use]
    pub fn new(connection: ConnectionHandle, refresh_interval: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                topics: AHashMap::new(),
                index: AHashMap::new(),
                freshness: FreshnessTracker::new(refresh_interval),
            }),
            connection,
        }
    }

    /// Registers `handler` for `topic` and returns its id.
    ///
    /// The first subscription for a topic creates its freshness record, sends a subscribe
    /// intent and ensures the connection is up.
    pub fn subscribe(&self, topic: Topic, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId::next();
        let mut state = self.state.lock().expect(MUTEX_POISONED);

        let registrations = state.topics.entry(topic).or_default();
        let first = registrations.is_empty();
        registrations.push(Registration {
            id,
            handler,
            active: Arc::new(AtomicBool::new(true)),
        });
        state.index.insert(id, topic);

        if first {
            tracing::debug!(%topic, "Activating topic");
            state.freshness.track(topic);
            self.connection.send(SubscriptionIntent::Subscribe(topic));
            self.connection.ensure_connected();
        }

        tracing::debug!(%topic, subscription = %id, "Subscribed");
        id
    }

    /// Removes the registration `id`. Returns `false` if it was already removed.
    ///
    /// No dispatch that starts after this returns reaches the callback. A dispatch already
    /// running on another thread may still make one final invocation.
    ///
    /// Removing the last subscription of a topic sends an unsubscribe intent and drops its
    /// freshness record; removing the last topic tears the connection down.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock().expect(MUTEX_POISONED);

        let Some(topic) = state.index.remove(&id) else {
            return false;
        };

        let mut topic_emptied = true;
        if let Some(registrations) = state.topics.get_mut(&topic) {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                let removed = registrations.remove(pos);
                removed.active.store(false, Ordering::SeqCst);
            }
            topic_emptied = registrations.is_empty();
        }
        tracing::debug!(%topic, subscription = %id, "Unsubscribed");

        if topic_emptied {
            tracing::debug!(%topic, "Deactivating topic");
            state.topics.remove(&topic);
            state.freshness.untrack(&topic);
            self.connection.send(SubscriptionIntent::Unsubscribe(topic));

            if state.topics.is_empty() {
                self.connection.teardown();
            }
        }

        true
    }

    /// Delivers `message` to every callback registered for its topic, in registration order,
    /// and returns how many were invoked.
    ///
    /// A panicking callback is logged and does not prevent delivery to the rest. Messages for
    /// unregistered topics are discarded.
    pub fn dispatch(&self, message: &TopicMessage) -> usize {
        let registrations = {
            let mut state = self.state.lock().expect(MUTEX_POISONED);
            let Some(registrations) = state.topics.get(&message.topic).cloned() else {
                tracing::debug!(topic = %message.topic, "Discarding message for inactive topic");
                return 0;
            };
            state
                .freshness
                .record_update(&message.topic, message.received_at);
            registrations
        };

        // Callbacks run without the lock so they may subscribe or unsubscribe
        let mut invoked = 0;
        for registration in &registrations {
            if !registration.active.load(Ordering::SeqCst) {
                continue;
            }

            let handler = &registration.handler;
            if let Err(e) = panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
                tracing::error!(
                    topic = %message.topic,
                    subscription = %registration.id,
                    "Callback panicked: {}",
                    panic_message(e.as_ref()),
                );
            }
            invoked += 1;
        }

        tracing::trace!(topic = %message.topic, source = %message.source, invoked, "Dispatched");
        invoked
    }

    /// Returns every topic with at least one subscription, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        let state = self.state.lock().expect(MUTEX_POISONED);
        let mut topics: Vec<Topic> = state.topics.keys().copied().collect();
        topics.sort();
        topics
    }

    #[must_use]
    pub fn is_active(&self, topic: &Topic) -> bool {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.topics.contains_key(topic)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.topics.is_empty()
    }

    #[must_use]
    pub fn subscription_count(&self, topic: &Topic) -> usize {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.topics.get(topic).map_or(0, Vec::len)
    }

    /// Returns a copy of the freshness record for `topic`.
    #[must_use]
    pub fn freshness(&self, topic: &Topic) -> Option<FreshnessRecord> {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.freshness.get(topic).cloned()
    }

    #[must_use]
    pub fn freshness_tiers(&self, now: UnixNanos) -> BTreeMap<Topic, FreshnessTier> {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.freshness.tiers(now)
    }

    /// Returns the time until `topic` is due a refresh, or `None` if it is not active.
    #[must_use]
    pub fn next_refresh_in(&self, topic: &Topic, now: UnixNanos) -> Option<Duration> {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state
            .freshness
            .get(topic)
            .map(|record| next_refresh_in(record, now))
    }

    /// Returns the most recent update across all active topics.
    #[must_use]
    pub fn last_update(&self) -> Option<UnixNanos> {
        let state = self.state.lock().expect(MUTEX_POISONED);
        state.freshness.last_update()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
