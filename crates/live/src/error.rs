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

use airfeed_network::error::FetchError;
use thiserror::Error;

/// Result type for client construction and configuration.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors raised while building a [`RealtimeClient`](crate::RealtimeClient).
///
/// Runtime failures never surface here: they are absorbed by the connection manager and
/// reported through the status snapshot.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),
    /// The configuration was parsed but holds invalid values.
    #[error("Invalid config: {0}")]
    Validation(String),
    /// The fallback fetcher could not be built.
    #[error("Fetcher error: {0}")]
    Fetch(#[from] FetchError),
}

impl From<toml::de::Error> for RealtimeError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}
