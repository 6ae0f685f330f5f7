//! JSON codec for DDP frames.
//!
//! Wire format: one UTF-8 JSON object per WebSocket text message.
//!
//! ```text
//! {"msg":"method","method":"loadHistory","id":"7","params":["GENERAL",null,10,null]}
//! {"msg":"result","id":"7","result":{"messages":[...]}}
//! {"msg":"result","id":"8","error":{"error":"error-invalid-room","reason":"Invalid room"}}
//! ```
//!
//! Decoding never panics.  Anything that is not a well-formed frame comes
//! back as a [`ProtocolError`] so the caller can log it and move on.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::messages::{
    CallId, DecodedResponse, ErrorDetail, InboundFrame, OutboundFrame, DDP_SUPPORTED_VERSIONS,
    DDP_VERSION,
};
use crate::protocol::params::Param;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The bytes are not valid JSON (including truncated input).
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The top-level JSON value is not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A field required by the frame kind is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The `id` of a result frame is not a correlation id this client issues.
    #[error("invalid call id: {0}")]
    InvalidCallId(String),

    /// A result was expected but the frame is of another kind.
    #[error("expected a result frame, got {0}")]
    NotAResult(&'static str),

    /// A frame could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a `method` frame invoking `method` with `params`.
///
/// The id is **not** allocated here – pass one obtained from the pending-call
/// registry so the frame and the registry entry agree.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use rocketchat_core::{encode_method_call, CallId, Param};
///
/// let frame = encode_method_call(CallId::new(3), "getRoomRoles", &[Param::from("GENERAL")]).unwrap();
/// assert_eq!(frame, r#"{"msg":"method","method":"getRoomRoles","id":"3","params":["GENERAL"]}"#);
/// ```
pub fn encode_method_call(
    id: CallId,
    method: &str,
    params: &[Param],
) -> Result<String, ProtocolError> {
    encode(&OutboundFrame::Method {
        method,
        id: id.to_string(),
        params,
    })
}

/// Encodes the `connect` handshake frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_connect() -> Result<String, ProtocolError> {
    encode(&OutboundFrame::Connect {
        version: DDP_VERSION,
        support: DDP_SUPPORTED_VERSIONS,
    })
}

/// Encodes a `pong` answering a server `ping`, echoing its id if it had one.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_pong(id: Option<&str>) -> Result<String, ProtocolError> {
    encode(&OutboundFrame::Pong { id })
}

fn encode(frame: &OutboundFrame<'_>) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::Encode(e.to_string()))
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one inbound frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are not a JSON object, or if a
/// result frame lacks a usable `id`.
///
/// # Examples
///
/// ```rust
/// use rocketchat_core::{decode_frame, InboundFrame};
///
/// let frame = decode_frame(br#"{"msg":"ping","id":"p1"}"#).unwrap();
/// assert_eq!(frame, InboundFrame::Ping { id: Some("p1".to_string()) });
/// ```
pub fn decode_frame(raw: &[u8]) -> Result<InboundFrame, ProtocolError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| ProtocolError::Json(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let msg = obj.get("msg").and_then(Value::as_str).map(str::to_owned);
    match msg.as_deref() {
        Some("result") => decode_result_fields(obj),
        // Some proxies strip `msg`; an id plus a result/error is still a result.
        None if obj.contains_key("id")
            && (obj.contains_key("result") || obj.contains_key("error")) =>
        {
            decode_result_fields(obj)
        }
        Some("connected") => Ok(InboundFrame::Connected {
            session: take_string(&mut obj, "session"),
        }),
        Some("failed") => Ok(InboundFrame::Failed {
            version: take_string(&mut obj, "version"),
        }),
        Some("ping") => Ok(InboundFrame::Ping {
            id: take_string(&mut obj, "id"),
        }),
        Some("pong") => Ok(InboundFrame::Pong),
        _ => Ok(InboundFrame::Other { msg: msg.clone() }),
    }
}

/// Decodes a frame that must be a method result.
///
/// Returns the correlation id and the decoded response.  A frame containing
/// an `error` key always decodes to [`DecodedResponse::Failure`], even when a
/// `result` key is present too.
///
/// # Errors
///
/// Returns [`ProtocolError::NotAResult`] for well-formed frames of other kinds,
/// and any error [`decode_frame`] can return.
pub fn decode_result(raw: &[u8]) -> Result<(CallId, DecodedResponse), ProtocolError> {
    match decode_frame(raw)? {
        InboundFrame::Result { id, response } => Ok((id, response)),
        other => Err(ProtocolError::NotAResult(other.kind())),
    }
}

fn decode_result_fields(mut obj: Map<String, Value>) -> Result<InboundFrame, ProtocolError> {
    let raw_id = obj.get("id").ok_or(ProtocolError::MissingField("id"))?;
    let id = CallId::from_wire(raw_id).ok_or_else(|| ProtocolError::InvalidCallId(raw_id.to_string()))?;

    let response = match obj.remove("error") {
        Some(error) => DecodedResponse::Failure(ErrorDetail::from_value(error)),
        None => DecodedResponse::Success(obj.remove("result").unwrap_or(Value::Null)),
    };
    Ok(InboundFrame::Result { id, response })
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
