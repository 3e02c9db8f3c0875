//! Encoding and decoding of banter frames.
//!
//! Inbound decoding never fails: structured key-value payloads have their
//! `content` field extracted, and everything else falls back to raw-content
//! mode instead of erroring the connection.

use serde_json::Value;
use thiserror::Error;

use crate::frames::{Inbound, ServerFrame};

/// Protocol errors that can occur while producing outbound frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization error.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Decode an inbound client frame.
///
/// A JSON object is treated as structured data: its `content` field (empty
/// when missing or not a string) and optional `receiver_id` are extracted.
/// Any other input, JSON or not, is used verbatim as raw message content.
/// Content is trimmed in both modes.
#[must_use]
pub fn decode_inbound(text: &str) -> Inbound {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            let content = map
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let receiver_id = map
                .get("receiver_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            Inbound::Structured {
                receiver_id,
                content,
            }
        }
        _ => Inbound::Raw(text.trim().to_string()),
    }
}

/// Encode an outbound frame to its JSON text representation.
///
/// Broadcast paths call this once per frame and fan the resulting string
/// out, so every recipient sees byte-identical payloads.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}
