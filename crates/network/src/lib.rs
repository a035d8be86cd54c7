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

//! Transport machinery for the airfeed real-time delivery workspace.
//!
//! The `airfeed-network` crate provides the pieces of the delivery stack that talk to the
//! outside world, or decide when to:
//!
//! - [`backoff::ReconnectPolicy`] for bounded exponential reconnection delays.
//! - [`mode::ConnectionState`] for the persistent connection lifecycle.
//! - The [`websocket::Connector`] and [`websocket::Connection`] traits with a
//!   tokio-tungstenite implementation.
//! - The [`http::TopicFetcher`] trait with a reqwest implementation for fallback polling.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod error;
pub mod http;
pub mod mode;
pub mod tls;
pub mod websocket;
