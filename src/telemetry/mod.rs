//! # Telemetry Module
//!
//! Decoded telemetry messages and the most-recent-message-per-type snapshot.
//!
//! This module handles:
//! - The [`Message`] record delivered by the ground station feed
//! - The [`MessageSnapshot`] used for lagging field evaluation
//! - Field expressions over the snapshot ([`expression`])
//! - Reading the JSON-lines feed ([`feed`])

pub mod expression;
pub mod feed;

use serde::Deserialize;
use std::collections::HashMap;

/// A decoded telemetry message.
///
/// The type tag is the message name (e.g. `VFR_HUD`, `SYS_STATUS`) and the
/// fields are its numeric payload values.
///
/// # Examples
///
/// ```
/// use flight_testpilot::telemetry::Message;
///
/// let msg = Message::new("VFR_HUD").with_field("airspeed", 12.5);
/// assert_eq!(msg.msg_type(), "VFR_HUD");
/// assert_eq!(msg.field("airspeed"), Some(12.5));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    msg_type: String,

    #[serde(default)]
    fields: HashMap<String, f64>,
}

impl Message {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: HashMap::new(),
        }
    }

    /// Adds a field value, builder style.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Returns the message type tag.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// Most recent message of each type seen on the feed.
///
/// Each type owns one slot that is overwritten on every arrival; nothing is
/// ever rolled back.
#[derive(Debug, Clone, Default)]
pub struct MessageSnapshot {
    latest: HashMap<String, Message>,
}

impl MessageSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot for the message's type.
    pub fn update(&mut self, msg: Message) {
        self.latest.insert(msg.msg_type.clone(), msg);
    }

    /// Returns the latest message of a type, if one has been observed.
    #[must_use]
    pub fn latest(&self, msg_type: &str) -> Option<&Message> {
        self.latest.get(msg_type)
    }

    /// Number of distinct message types observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Returns true if no message has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
