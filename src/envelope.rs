//! Wire protocol envelope definitions and line codec
//!
//! Every record on the wire is one newline-terminated JSON object matching
//! the `Envelope` schema. Uses Serde's tagged enum for type-safe
//! serialization/deserialization; decoding assumes the transport has already
//! isolated one complete record (line framing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentiment verdict attached to a chat message by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Classifier label, e.g. "POSITIVE" or "NEGATIVE"
    pub label: String,
    /// Confidence score in [0, 1]
    pub score: f64,
}

/// One structured message unit exchanged over the wire
///
/// Tagged enum with snake_case naming. Clients send `login` first and
/// `chat_message` afterwards; everything else is server-originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Login handshake (first record from a client)
    Login { username: String },
    /// Chat text; the server fills in username, sentiment, and timestamp
    /// before fanning it out
    ChatMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sentiment: Option<Sentiment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Join/leave/welcome announcements, eligible for broadcast
    ServerNotification {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Reply to a command, addressed to the asker only
    ServerResponse {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Recoverable failure report, addressed to the originating connection
    Error { message: String },
}

impl Envelope {
    /// Build a sentiment-tagged chat message from a logged-in sender
    pub fn chat(username: impl Into<String>, message: impl Into<String>, sentiment: Sentiment) -> Self {
        Self::ChatMessage {
            username: Some(username.into()),
            message: message.into(),
            sentiment: Some(sentiment),
            timestamp: Some(Utc::now()),
        }
    }

    /// Build a server notification (join/leave/welcome)
    pub fn notification(message: impl Into<String>) -> Self {
        Self::ServerNotification {
            message: message.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Build a direct command response
    pub fn response(message: impl Into<String>) -> Self {
        Self::ServerResponse {
            message: message.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Build an error report
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this envelope may be fanned out to other sessions
    ///
    /// `server_response` and `error` are addressed to a single connection and
    /// must use direct send.
    pub fn is_broadcastable(&self) -> bool {
        matches!(
            self,
            Envelope::ChatMessage { .. } | Envelope::ServerNotification { .. }
        )
    }
}

/// Decode failure for one wire record
///
/// `MissingType` is separated out because records without a `"type"` key are
/// silently ignored after login rather than answered with an error.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The record is not valid JSON at all
    #[error("record is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// The record is valid JSON but not an object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// The record is a JSON object without a "type" key
    #[error("record has no \"type\" field")]
    MissingType,

    /// The record is typed but does not match any envelope variant
    #[error("record does not match the envelope schema: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Encode an envelope as one newline-terminated JSON record
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    let mut record = serde_json::to_string(envelope)?;
    record.push('\n');
    Ok(record)
}

/// Decode one record's bytes into an envelope
///
/// Never panics; every malformed input maps to a `DecodeError` variant.
pub fn decode(record: &str) -> Result<Envelope, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(record).map_err(DecodeError::Syntax)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    if !object.contains_key("type") {
        return Err(DecodeError::MissingType);
    }
    serde_json::from_value(value).map_err(DecodeError::Schema)
}
