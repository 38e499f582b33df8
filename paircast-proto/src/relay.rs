//! Relay wire protocol types for the Paircast relay server.
//!
//! Defines the [`RelayFrame`] enum that is JSON-encoded and sent over
//! WebSocket text frames between clients and the relay server.

use serde::{Deserialize, Serialize};

use crate::message::MAX_MESSAGE_SIZE;

/// Bytes reserved in a frame for everything but the message text: the
/// frame tag, field names, identities and timestamp.
pub const FRAME_ENVELOPE_ALLOWANCE: usize = 4 * 1024;

/// Largest `submit` frame a client produces for a valid message.
///
/// JSON escapes a control character as `\u00XX`, so text of
/// [`MAX_MESSAGE_SIZE`] bytes can grow sixfold once encoded.
pub const MAX_FRAME_SIZE: usize = 6 * MAX_MESSAGE_SIZE + FRAME_ENVELOPE_ALLOWANCE;

/// Error type for relay frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Serialization or deserialization failed.
    #[error("relay frame codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frames exchanged between relay clients and the relay server.
///
/// The relay protocol is a plain broadcast: any client may submit a message
/// and the relay re-emits it to every connection, the submitter included.
/// The relay never inspects the `message` payload; it is carried as an
/// arbitrary JSON value and validated by receiving clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Server confirms the connection is registered for fan-out.
    ///
    /// Always the first frame a client receives. Every `Submit` processed
    /// after this point is delivered to the connection.
    Welcome {
        /// Server-assigned identifier of this connection.
        connection_id: String,
    },

    /// A message submitted by a client for broadcast.
    Submit {
        /// Opaque message payload.
        message: serde_json::Value,
    },

    /// A message re-emitted by the relay to every connected client.
    Deliver {
        /// The submitted payload, forwarded verbatim.
        message: serde_json::Value,
    },

    /// Server reports an error condition to a single client.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`RelayFrame`] into JSON text.
///
/// # Errors
///
/// Returns [`FrameError::Json`] if the frame cannot be serialized.
pub fn encode(frame: &RelayFrame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a [`RelayFrame`] from JSON text.
///
/// # Errors
///
/// Returns [`FrameError::Json`] if the text is not a valid frame.
pub fn decode(text: &str) -> Result<RelayFrame, FrameError> {
    Ok(serde_json::from_str(text)?)
}
