//! The `{ name, data }` envelope exchanged with clients.
//!
//! Inbound envelopes carry a command name (`"channel subscribe"`) and an
//! arbitrary JSON payload. Outbound envelopes reuse the same shape: replies
//! use a fixed name (`"error"`, `"check login"`), feed events use
//! `"<entity> <verb>"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope name for error replies.
pub const ERROR: &str = "error";

/// Message sent for commands that have no registered handler.
pub const UNKNOWN_COMMAND: &str = "unknown command";

/// Errors produced while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON or lacks a string `name`.
    #[error("invalid envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame decoded but the command name is blank.
    #[error("invalid envelope: empty name")]
    EmptyName,
}

/// Wire unit for both inbound commands and outbound events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command or event name.
    pub name: String,
    /// Opaque payload. Missing on the wire decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from a name and payload.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Build an `error` envelope carrying a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR, Value::String(message.into()))
    }

    /// Whether this is an `error` envelope.
    pub fn is_error(&self) -> bool {
        self.name == ERROR
    }

    /// Decode an inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_str(frame)?;
        if envelope.name.trim().is_empty() {
            return Err(EnvelopeError::EmptyName);
        }
        Ok(envelope)
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
