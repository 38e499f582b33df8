//! Wire format message types for the `Paircast` protocol.
//!
//! A chat message is a flat JSON object `{text, from, to, timestamp}`. The
//! relay forwards it verbatim, so every client re-validates inbound payloads
//! with [`ChatMessage::from_event`] before trusting them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed message text size in bytes (64 KB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Opaque participant identifier. Claimed, never verified.
pub type Identity = String;

/// A single chat message between two identities.
///
/// Immutable once created. Equality of content for deduplication is
/// [`ChatMessage::same_content`], which ignores the timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// Sending identity.
    pub from: Identity,
    /// Receiving identity.
    pub to: Identity,
    /// Creation instant as recorded by the sender.
    pub timestamp: DateTime<Utc>,
}

/// Error returned when a message or inbound event fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The event payload is not a JSON object.
    #[error("event payload is not an object")]
    NotAnObject,
    /// A required field is absent, not a string, or (for identities) empty.
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),
    /// Message text is empty.
    #[error("message text is empty")]
    Empty,
    /// Message text exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    pub fn new(text: impl Into<String>, from: impl Into<Identity>, to: impl Into<Identity>) -> Self {
        Self::with_timestamp(text, from, to, Utc::now())
    }

    /// Creates a message with an explicit timestamp.
    pub fn with_timestamp(
        text: impl Into<String>,
        from: impl Into<Identity>,
        to: impl Into<Identity>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            text: text.into(),
            from: from.into(),
            to: to.into(),
            timestamp,
        }
    }

    /// Returns `true` if `other` carries the same text, sender and recipient.
    ///
    /// Timestamps are not compared: a redelivered or re-stamped copy of a
    /// message is still the same message.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.text == other.text && self.from == other.from && self.to == other.to
    }

    /// Validates this message before it is stored or submitted.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for empty text,
    /// [`ValidationError::TooLarge`] above [`MAX_MESSAGE_SIZE`], and
    /// [`ValidationError::MissingField`] for an empty `from` or `to`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            return Err(ValidationError::MissingField("from"));
        }
        if self.to.is_empty() {
            return Err(ValidationError::MissingField("to"));
        }
        if self.text.is_empty() {
            return Err(ValidationError::Empty);
        }
        let size = self.text.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(ValidationError::TooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }

    /// Builds a message from an untrusted relay payload.
    ///
    /// `text`, `from` and `to` must be present strings. `timestamp` is
    /// accepted as an RFC 3339 string or as epoch milliseconds; when it is
    /// absent or unreadable, `received_at` is recorded instead.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is not an object, a
    /// required field is missing, or the resulting message is invalid.
    pub fn from_event(
        payload: &serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let obj = payload.as_object().ok_or(ValidationError::NotAnObject)?;

        let field = |name: &'static str| {
            obj.get(name)
                .and_then(serde_json::Value::as_str)
                .ok_or(ValidationError::MissingField(name))
        };
        let text = field("text")?;
        let from = field("from")?;
        let to = field("to")?;

        let timestamp = obj
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        let msg = Self::with_timestamp(text, from, to, timestamp);
        msg.validate()?;
        Ok(msg)
    }

    /// Serializes this message into the JSON value carried by relay frames.
    #[must_use]
    pub fn to_event(&self) -> serde_json::Value {
        serde_json::json!({
            "text": self.text,
            "from": self.from,
            "to": self.to,
            "timestamp": self.timestamp,
        })
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
