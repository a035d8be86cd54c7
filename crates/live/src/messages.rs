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

//! Topics, subscription identifiers, delivered messages and the JSON wire frames.
//!
//! Every frame, in both directions, has the shape:
//!
//! ```json
//! { "type": "subscribe" | "unsubscribe" | "data" | "error",
//!   "topic": "...",
//!   "payload": { ... },
//!   "timestamp": "..." }
//! ```
//!
//! Client frames carry only `type` and `topic`.

use std::{
    fmt::Display,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use airfeed_core::UnixNanos;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use thiserror::Error;
use ustr::Ustr;

/// A logical channel of updates, such as one monitored location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Ustr);

impl Topic {
    /// Creates a new [`Topic`] instance.
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(Ustr::from(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub const fn inner(&self) -> Ustr {
        self.0
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registration of a callback for a topic.
///
/// Allocated from a process-wide counter, so ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next unused id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The transport which delivered a [`TopicMessage`].
///
/// Informational only: dispatch treats both sources identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliverySource {
    /// Pushed over the persistent connection.
    Push,
    /// Fetched by the fallback poller.
    Poll,
}

/// An update for a topic, as delivered to consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: Topic,
    pub payload: Value,
    /// When this process received the update.
    pub received_at: UnixNanos,
    /// The server's timestamp, passed through unparsed.
    pub source_timestamp: Option<String>,
    pub source: DeliverySource,
}

impl TopicMessage {
    /// Creates a new [`TopicMessage`] for a pushed `data` frame.
    #[must_use]
    pub const fn push(
        topic: Topic,
        payload: Value,
        received_at: UnixNanos,
        source_timestamp: Option<String>,
    ) -> Self {
        Self {
            topic,
            payload,
            received_at,
            source_timestamp,
            source: DeliverySource::Push,
        }
    }

    /// Creates a new [`TopicMessage`] for a successful fallback poll.
    #[must_use]
    pub const fn poll(topic: Topic, payload: Value, received_at: UnixNanos) -> Self {
        Self {
            topic,
            payload,
            received_at,
            source_timestamp: None,
            source: DeliverySource::Poll,
        }
    }
}

/// The `type` discriminator of a wire frame.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Subscribe,
    Unsubscribe,
    Data,
    Error,
}

/// Errors for a single inbound frame. The frame is discarded; the connection is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    Json(String),
    #[error("Missing frame type")]
    MissingType,
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
    #[error("Missing topic")]
    MissingTopic,
    #[error("Data frame without an object payload")]
    MissingPayload,
}

impl From<serde_json::Error> for FrameError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// A JSON frame exchanged over the persistent connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub topic: Topic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl WireFrame {
    /// Parses an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, or if `type` or `topic` is missing
    /// or invalid.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut object) = value else {
            return Err(FrameError::Json("frame is not an object".to_string()));
        };

        let frame_type = match object.get("type") {
            Some(Value::String(kind)) => {
                FrameType::from_str(kind).map_err(|_| FrameError::UnknownType(kind.clone()))?
            }
            Some(other) => return Err(FrameError::UnknownType(other.to_string())),
            None => return Err(FrameError::MissingType),
        };

        let topic = match object.get("topic") {
            Some(Value::String(topic)) if !topic.is_empty() => Topic::new(topic),
            _ => return Err(FrameError::MissingTopic),
        };

        let payload = object.remove("payload").filter(|p| !p.is_null());
        if frame_type == FrameType::Data && !matches!(payload, Some(Value::Object(_))) {
            return Err(FrameError::MissingPayload);
        }

        let timestamp = match object.remove("timestamp") {
            Some(Value::String(ts)) => Some(ts),
            // Numeric epoch timestamps are kept in their JSON text form
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Self {
            frame_type,
            topic,
            payload,
            timestamp,
        })
    }

    /// Returns the `payload.message` of an `error` frame.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.payload.as_ref()?.get("message")?.as_str()
    }
}

/// A subscribe or unsubscribe request destined for the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionIntent {
    Subscribe(Topic),
    Unsubscribe(Topic),
}

impl SubscriptionIntent {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) => *topic,
        }
    }

    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self {
            Self::Subscribe(_) => FrameType::Subscribe,
            Self::Unsubscribe(_) => FrameType::Unsubscribe,
        }
    }

    /// Returns the JSON text of the client frame for this intent.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "type": self.frame_type(),
            "topic": self.topic(),
        })
        .to_string()
    }
}

impl Display for SubscriptionIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.frame_type(), self.topic())
    }
}
