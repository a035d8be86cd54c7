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

//! Real-time update delivery for monitoring dashboards.
//!
//! The `airfeed-live` crate keeps consumers' data fresh over a single persistent connection
//! which multiplexes many logical topics. When the connection drops it reconnects with bounded
//! exponential backoff, and once the attempt budget is exhausted it degrades to periodic HTTP
//! polling, so consumers never need to know which transport is delivering.
//!
//! Components, leaves first:
//!
//! - [`freshness`]: staleness tiers and time to next refresh per topic.
//! - [`poller`]: fallback polling tasks.
//! - [`connection`]: the connection manager actor and its handle.
//! - [`registry`]: topic subscriptions and message dispatch.
//! - [`status`]: the user-facing status snapshot.
//! - [`client`]: the [`RealtimeClient`] facade tying them together.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod freshness;
pub mod messages;
pub mod poller;
pub mod registry;
pub mod status;

// Re-exports
pub use crate::{
    client::RealtimeClient,
    config::RealtimeConfig,
    messages::{SubscriptionId, Topic, TopicMessage},
    registry::{MessageHandler, channel_message_handler},
    status::StatusSnapshot,
};
