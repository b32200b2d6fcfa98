//! JSON wire codec for [`Message`].
//!
//! Decoding first checks the `kind` discriminant against the closed
//! [`MessageKind`] set, so unknown or missing kinds are reported precisely
//! instead of surfacing as a generic field error.

use serde_json::Value;

use super::events::{Message, MessageKind};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no `kind` discriminant")]
    MissingKind,

    #[error("unknown message kind `{0}`")]
    UnknownKind(String),

    #[error("malformed {kind}: {source}")]
    Fields {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialize a message into its flat wire form.
pub fn encode(message: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a raw wire payload.
pub fn decode(raw: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(raw)?;
    decode_value(value)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(value: Value) -> Result<Message, CodecError> {
    let object = value.as_object().ok_or(CodecError::NotAnObject)?;
    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingKind)?;
    let kind = MessageKind::parse(kind).ok_or_else(|| CodecError::UnknownKind(kind.to_string()))?;

    serde_json::from_value(value).map_err(|source| CodecError::Fields { kind, source })
}
