//! Channel protocol message types
//!
//! Inbound messages are decoded once at the boundary into a closed
//! [`IncomingMessage`] sum type; the protocol loop then matches
//! exhaustively. Unknown `type` tags and malformed envelopes are separate
//! outcomes of [`parse_incoming`] so the loop can answer each by name.

use serde::{Deserialize, Serialize};

use crate::core::detect::NormalizedBox;

/// The `type` tags the protocol understands; anything else is echoed back
/// as an unknown message type
const KNOWN_TYPES: &[&str] = &[
    "set_animal",
    "message",
    "image",
    "audio",
    "start_tracking",
    "stop_tracking",
];

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from the client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// Bind the session persona explicitly
    SetAnimal {
        #[serde(default)]
        animal_type: Option<String>,
    },

    /// Chat text; requires a bound persona
    Message {
        #[serde(default)]
        content: String,
    },

    /// One camera frame, base64-encoded
    Image {
        #[serde(default)]
        data: String,
        #[serde(default)]
        filename: Option<String>,
    },

    /// One voice message, base64-encoded
    Audio {
        #[serde(default)]
        data: String,
        #[serde(default)]
        filename: Option<String>,
    },

    /// Enter tracking mode for the given target label
    StartTracking {
        #[serde(default)]
        animal_type: Option<String>,
    },

    /// Leave tracking mode
    StopTracking,
}

/// Result of decoding one text frame
#[derive(Debug, PartialEq)]
pub enum ParsedInbound {
    Known(IncomingMessage),
    /// Well-formed envelope with a `type` the protocol does not know
    UnknownType(String),
    /// Envelope that did not parse
    Invalid(String),
}

/// Decode one raw text frame into a protocol message
pub fn parse_incoming(raw: &str) -> ParsedInbound {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return ParsedInbound::Invalid(e.to_string()),
    };
    if !value.is_object() {
        return ParsedInbound::Invalid("message must be a JSON object".to_string());
    }
    let msg_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    match serde_json::from_value::<IncomingMessage>(value) {
        Ok(message) => ParsedInbound::Known(message),
        Err(e) => {
            if KNOWN_TYPES.contains(&msg_type.as_str()) {
                ParsedInbound::Invalid(e.to_string())
            } else {
                ParsedInbound::UnknownType(msg_type)
            }
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing WebSocket messages to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Plain text: chat replies, acks, guidance, and error reports
    Text { data: String },

    /// Synthesized speech, base64-encoded
    Audio { data: String, format: String },

    /// One-shot detection result; `data` is the JSON-encoded normalized box
    Bbox { data: String },

    /// Continuous tracking update
    TrackingResult {
        object_name: String,
        confidence: f32,
        #[serde(rename = "boundingBox")]
        bounding_box: NormalizedBox,
    },

    /// Tracking lifecycle notification
    TrackingStatus {
        status: TrackingStatusKind,
        message: String,
    },
}

impl OutgoingMessage {
    pub fn text(data: impl Into<String>) -> Self {
        OutgoingMessage::Text { data: data.into() }
    }

    pub fn audio_mp3(data: impl Into<String>) -> Self {
        OutgoingMessage::Audio {
            data: data.into(),
            format: "mp3".to_string(),
        }
    }

    pub fn tracking_status(status: TrackingStatusKind, message: impl Into<String>) -> Self {
        OutgoingMessage::TrackingStatus {
            status,
            message: message.into(),
        }
    }
}

/// Tracking lifecycle states reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatusKind {
    Starting,
    Stopped,
    Error,
}
