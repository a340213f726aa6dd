//! Codec for encoding and decoding liveframe messages.
//!
//! Messages travel as JSON arrays, one message per transport frame.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::message::{Kind, Message};

/// Maximum encoded message size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Number of positional fields in a message.
pub const MESSAGE_FIELDS: usize = 5;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input is not a 5-element message array.
    #[error("unknown message type: {0}")]
    Shape(String),

    /// Kind literal is not one a client may send.
    #[error("unexpected protocol event: {0}")]
    UnknownEvent(String),

    /// Message exceeds maximum size.
    #[error("message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// Payload does not match the shape its kind requires.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// JSON encoding or parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a message to bytes.
///
/// # Errors
///
/// Returns an error if the message is too large or serialization fails.
pub fn encode(message: &Message) -> Result<Bytes, ProtocolError> {
    let data = serde_json::to_vec(message)?;

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }

    Ok(Bytes::from(data))
}

/// Decode a message from bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Shape`] unless the input is a JSON array of
/// `[joinRef|null, messageRef|null, topic, kind, payload]`, and
/// [`ProtocolError::UnknownEvent`] if `kind` is not an inbound kind.
pub fn decode(data: &[u8]) -> Result<Message, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }

    let value: Value = serde_json::from_slice(data)
        .map_err(|e| ProtocolError::Shape(format!("malformed json: {e}")))?;

    let Value::Array(fields) = value else {
        return Err(ProtocolError::Shape("expected a message array".to_string()));
    };
    if fields.len() != MESSAGE_FIELDS {
        return Err(ProtocolError::Shape(format!(
            "expected {MESSAGE_FIELDS} fields, got {}",
            fields.len()
        )));
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or(Value::Null);

    let join_ref = opt_ref(next(), "joinRef")?;
    let message_ref = opt_ref(next(), "messageRef")?;
    let topic = string_field(next(), "topic")?;
    let literal = string_field(next(), "kind")?;
    let payload = next();

    let kind = Kind::parse(&literal)
        .filter(Kind::is_inbound)
        .ok_or(ProtocolError::UnknownEvent(literal))?;

    Ok(Message {
        join_ref,
        message_ref,
        topic,
        kind,
        payload,
    })
}

fn opt_ref(value: Value, field: &str) -> Result<Option<String>, ProtocolError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        // Some clients send numeric refs.
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(ProtocolError::Shape(format!(
            "{field} must be a string or null, got {other}"
        ))),
    }
}

fn string_field(value: Value, field: &str) -> Result<String, ProtocolError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ProtocolError::Shape(format!(
            "{field} must be a string, got {other}"
        ))),
    }
}
