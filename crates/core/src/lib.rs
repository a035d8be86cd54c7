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

//! Core foundational types and utilities for the airfeed real-time delivery workspace.
//!
//! The `airfeed-core` crate is intentionally small. It supplies the building blocks shared by
//! the network and live crates:
//!
//! - Nanosecond UNIX timestamps ([`UnixNanos`]).
//! - A [`Clock`](clock::Clock) abstraction with live and test implementations.
//! - Shared constants such as the client user agent.
//! - Async test helpers.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod clock;
pub mod consts;
pub mod nanos;
pub mod testing;

// Re-exports
pub use crate::{
    clock::{Clock, LiveClock, TestClock},
    nanos::UnixNanos,
};

/// Message for when a mutex guard cannot be acquired due to poisoning.
///
/// Mutex guards should use `expect` rather than handle poison errors.
/// A poisoned mutex indicates a thread panicked while holding the lock,
/// so the protected state may be inconsistent.
pub const MUTEX_POISONED: &str = "Mutex poisoned";
