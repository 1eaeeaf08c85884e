//! Frame codec: [`GatewayFrame`] ⇄ JSON text messages.
//!
//! Decoding is total: every malformed input maps to a [`DecodeError`].
//! The `type` tag is inspected before the body so that an unknown kind and a
//! known kind with a broken body are reported differently.

use crate::{EventFrame, GatewayFrame, RequestFrame, ResponseFrame};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown frame type `{0}`")]
    UnknownKind(String),

    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },
}

/// Serialize a frame to its wire text.
pub fn encode(frame: &GatewayFrame) -> String {
    // Frames only hold string-keyed maps, so serialization cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Parse one wire message into a frame.
pub fn decode(text: &str) -> Result<GatewayFrame, DecodeError> {
    let mut value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::NotJson)?;
    let obj = value.as_object_mut().ok_or(DecodeError::NotAnObject)?;
    let kind = match obj.remove("type") {
        Some(serde_json::Value::String(kind)) => kind,
        _ => return Err(DecodeError::MissingType),
    };

    match kind.as_str() {
        "req" => serde_json::from_value::<RequestFrame>(value)
            .map(GatewayFrame::Request)
            .map_err(|source| DecodeError::Malformed { kind: "req", source }),
        "res" => serde_json::from_value::<ResponseFrame>(value)
            .map(GatewayFrame::Response)
            .map_err(|source| DecodeError::Malformed { kind: "res", source }),
        "event" => serde_json::from_value::<EventFrame>(value)
            .map(GatewayFrame::Event)
            .map_err(|source| DecodeError::Malformed {
                kind: "event",
                source,
            }),
        _ => Err(DecodeError::UnknownKind(kind)),
    }
}

/// Like [`decode`], but rejects messages larger than `max_bytes` unparsed.
pub fn decode_bounded(text: &str, max_bytes: usize) -> Result<GatewayFrame, DecodeError> {
    if text.len() > max_bytes {
        return Err(DecodeError::Oversized {
            len: text.len(),
            max: max_bytes,
        });
    }
    decode(text)
}
