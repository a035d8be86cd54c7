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

//! The user-facing connection status snapshot.

use std::{collections::BTreeMap, fmt::Display};

use airfeed_core::UnixNanos;
use airfeed_network::mode::ConnectionState;
use tokio::sync::watch;

use crate::{freshness::FreshnessTier, messages::Topic};

/// A point-in-time view of the client's connection and data freshness.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub is_reconnecting: bool,
    /// Consecutive reconnection attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// The most relevant current problem, cleared once it is resolved.
    pub last_error: Option<String>,
    /// Time of the most recent message on any topic.
    pub last_update: Option<UnixNanos>,
    pub topics: BTreeMap<Topic, FreshnessTier>,
    /// Fallback pollers are running. Stays set through a manual retry until a connection succeeds.
    pub polling: bool,
}

impl StatusSnapshot {
    /// Creates a new [`StatusSnapshot`], deriving the state flags from `state`.
    #[must_use]
    pub fn new(
        state: ConnectionState,
        reconnect_attempts: u32,
        last_error: Option<String>,
        last_update: Option<UnixNanos>,
        topics: BTreeMap<Topic, FreshnessTier>,
    ) -> Self {
        Self {
            state,
            is_connected: state.is_connected(),
            is_connecting: state.is_connecting(),
            is_reconnecting: state.is_reconnecting(),
            reconnect_attempts,
            last_error,
            last_update,
            topics,
            polling: false,
        }
    }

    /// Marks whether fallback polling is active.
    #[must_use]
    pub fn with_polling(mut self, polling: bool) -> Self {
        self.polling = polling;
        self
    }

    /// Returns `true` if data is currently delivered by fallback polling.
    #[must_use]
    pub const fn is_polling(&self) -> bool {
        self.polling
    }
}

impl Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "state={} attempts={}", self.state, self.reconnect_attempts)?;
        if let Some(last_update) = self.last_update {
            write!(f, " last_update={}", last_update.to_rfc3339())?;
        }
        if !self.topics.is_empty() {
            let topics: Vec<String> = self
                .topics
                .iter()
                .map(|(topic, tier)| format!("{topic}:{tier}"))
                .collect();
            write!(f, " topics=[{}]", topics.join(","))?;
        }
        if let Some(error) = &self.last_error {
            write!(f, " last_error=\"{error}\"")?;
        }
        Ok(())
    }
}

/// Publishes [`StatusSnapshot`]s to any number of watchers.
///
/// Watchers are only notified when the snapshot actually changes.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusPublisher {
    /// Creates a new [`StatusPublisher`] holding the default (idle) snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    /// Replaces the current snapshot, returning `true` if it changed.
    pub fn publish(&self, snapshot: StatusSnapshot) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Returns a receiver which observes every future change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}
