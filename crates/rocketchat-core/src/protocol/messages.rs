//! DDP frame types exchanged with a Rocket.Chat server.
//!
//! Every frame is a JSON object whose `msg` field names its kind.  The client
//! only needs a handful of kinds:
//!
//! ```text
//! client → server   {"msg":"connect","version":"1","support":["1"]}
//! server → client   {"msg":"connected","session":"Kx9..."}
//! client → server   {"msg":"method","method":"browseChannels","id":"1","params":[...]}
//! server → client   {"msg":"result","id":"1","result":{...}}
//! server → client   {"msg":"ping"}          (answered with {"msg":"pong"})
//! ```
//!
//! Everything else the server pushes (subscription data such as `added` or
//! `changed`) is decoded as [`InboundFrame::Other`] and ignored by the client.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::protocol::params::Param;

// ── Protocol constants ────────────────────────────────────────────────────────

/// The DDP protocol version this client speaks.
pub const DDP_VERSION: &str = "1";

/// Versions offered in the `connect` frame, most preferred first.
pub const DDP_SUPPORTED_VERSIONS: &[&str] = &[DDP_VERSION];

// ── Correlation id ────────────────────────────────────────────────────────────

/// Identifier embedded in a `method` frame and echoed in its `result` frame.
///
/// On the wire the id is a decimal string (`"42"`); in memory it is a `u64`
/// handed out by [`crate::protocol::CallIdCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw id value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses the `id` field of an inbound frame.
    ///
    /// Accepts a decimal string of ASCII digits or a non-negative JSON
    /// integer.  Anything else cannot have been issued by this client.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().ok().map(Self)
            }
            Value::Number(n) => n.as_u64().map(Self),
            _ => None,
        }
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Outbound frames ───────────────────────────────────────────────────────────

/// Frames the client sends.
///
/// `#[serde(tag = "msg")]` writes the variant name into a `"msg"` field, so
/// `Method { .. }` serializes as `{"msg":"method",...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum OutboundFrame<'a> {
    /// Opens the DDP session.  Must be the first frame on the socket.
    Connect {
        version: &'a str,
        support: &'a [&'a str],
    },
    /// Invokes a remote method.
    Method {
        method: &'a str,
        id: String,
        params: &'a [Param],
    },
    /// Answers a server `ping`.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<&'a str>,
    },
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// Error detail carried in the `error` field of a failed `result` frame.
///
/// Meteor errors usually look like
/// `{"isClientSafe":true,"error":403,"reason":"Not allowed","message":"Not allowed [403]","errorType":"Meteor.Error"}`
/// but the field may hold any JSON value, so the raw value is always kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    /// The `error` code, rendered as text (`"403"`, `"error-invalid-room"`).
    pub code: Option<String>,
    /// Short human-readable reason.
    pub reason: Option<String>,
    /// Longer message, often the reason plus the code.
    pub message: Option<String>,
    /// Server-side error class, e.g. `Meteor.Error`.
    pub error_type: Option<String>,
    /// The `error` value exactly as received.
    pub raw: Value,
}

impl ErrorDetail {
    /// Extracts the well-known fields from an `error` value.
    pub fn from_value(raw: Value) -> Self {
        let text = |key: &str| -> Option<String> {
            match raw.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        Self {
            code: text("error"),
            reason: text("reason"),
            message: text("message"),
            error_type: text("errorType"),
            raw: raw.clone(),
        }
    }

    /// Builds a detail from a bare reason string (used for locally
    /// synthesized failures in tests and diagnostics).
    pub fn from_reason(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            code: None,
            reason: Some(reason.clone()),
            message: None,
            error_type: None,
            raw: Value::String(reason),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, &self.message, &self.code) {
            (Some(reason), _, Some(code)) => write!(f, "{reason} [{code}]"),
            (Some(reason), _, None) => f.write_str(reason),
            (None, Some(message), _) => f.write_str(message),
            (None, None, Some(code)) => write!(f, "error {code}"),
            (None, None, None) => write!(f, "{}", self.raw),
        }
    }
}

/// The outcome carried by a `result` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    /// The `result` field's contents (`null` for methods returning nothing).
    Success(Value),
    /// The `error` field's contents.
    Failure(ErrorDetail),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The server accepted the `connect` handshake.
    Connected { session: Option<String> },
    /// The server rejected the `connect` handshake.
    Failed { version: Option<String> },
    /// Server keepalive; must be answered with a pong echoing `id`.
    Ping { id: Option<String> },
    /// Answer to a client ping.  The client never pings, so this is ignored.
    Pong,
    /// The answer to one method call.
    Result {
        id: CallId,
        response: DecodedResponse,
    },
    /// Any other frame (subscription data, `server_id` greeting, ...).
    Other { msg: Option<String> },
}

impl InboundFrame {
    /// Short name used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Connected { .. } => "connected",
            InboundFrame::Failed { .. } => "failed",
            InboundFrame::Ping { .. } => "ping",
            InboundFrame::Pong => "pong",
            InboundFrame::Result { .. } => "result",
            InboundFrame::Other { .. } => "other",
        }
    }
}
