//! Callback dispatcher: runs one pending call's callback with its outcome.
//!
//! The dispatcher is the boundary between the session's frame-reading loop
//! and user code.  Whatever a callback does wrong stays on this side:
//!
//! - a callback returning `Err` is logged as a callback failure;
//! - a callback that panics is caught with [`std::panic::catch_unwind`] and
//!   logged with its panic message.
//!
//! Either way the next frame is processed normally and other pending calls
//! are unaffected.
//!
//! Dispatch order follows the order outcomes become available (frame arrival,
//! or issuance order during teardown), never the order calls were issued.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rocketchat_core::{CallId, DecodedResponse, ErrorDetail};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::registry::PendingCall;
use crate::application::session::ServerHandle;

/// Everything a callback can be told about its call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The server returned a result.
    Success(Value),
    /// The server returned an error.
    Failure(ErrorDetail),
    /// The connection was torn down before a response arrived.
    ConnectionLost,
    /// The timeout policy expired the call before a response arrived.
    TimedOut,
}

impl From<DecodedResponse> for CallOutcome {
    fn from(response: DecodedResponse) -> Self {
        match response {
            DecodedResponse::Success(v) => CallOutcome::Success(v),
            DecodedResponse::Failure(e) => CallOutcome::Failure(e),
        }
    }
}

impl CallOutcome {
    /// Converts the outcome into the success payload or a [`CallFailure`].
    pub fn into_result(self) -> Result<Value, CallFailure> {
        match self {
            CallOutcome::Success(v) => Ok(v),
            CallOutcome::Failure(e) => Err(CallFailure::Protocol(e)),
            CallOutcome::ConnectionLost => Err(CallFailure::ConnectionLost),
            CallOutcome::TimedOut => Err(CallFailure::TimedOut),
        }
    }
}

/// Why a call did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallFailure {
    /// The server answered with an `error`.
    #[error("{0}")]
    Protocol(ErrorDetail),
    /// The connection closed first.
    #[error("connection lost")]
    ConnectionLost,
    /// The call was expired by the timeout policy.
    #[error("timed out")]
    TimedOut,
    /// The success payload does not have the shape the method promises.
    #[error("malformed {method} result: {reason}")]
    MalformedPayload { method: String, reason: String },
}

/// What happened when a callback ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// The callback returned `Ok`.
    Delivered,
    /// The callback returned `Err`; holds the rendered error chain.
    CallbackFailed(String),
    /// The callback panicked; holds the panic message.
    CallbackPanicked(String),
}

/// Runs `entry`'s callback with `outcome`, exactly once.
///
/// Consuming the entry is what guarantees "once": the registry has already
/// removed it, and the callback is moved out and called here.
pub fn dispatch(server: &ServerHandle, entry: PendingCall, outcome: CallOutcome) -> DispatchReport {
    let (id, method, callback) = entry.into_parts();
    let kind = outcome_kind(&outcome);

    // `AssertUnwindSafe` is sound here: the callback is consumed by the call,
    // and the server handle only exposes lock-protected state.
    match panic::catch_unwind(AssertUnwindSafe(move || callback(server, outcome))) {
        Ok(Ok(())) => {
            debug!(server = %server.name(), call_id = %id, method = %method, outcome = kind, "callback delivered");
            DispatchReport::Delivered
        }
        Ok(Err(e)) => {
            let rendered = format!("{e:#}");
            warn!(server = %server.name(), call_id = %id, method = %method, "callback failed: {rendered}");
            DispatchReport::CallbackFailed(rendered)
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(server = %server.name(), call_id = %id, method = %method, "callback panicked: {message}");
            DispatchReport::CallbackPanicked(message)
        }
    }
}

/// Dispatches every entry with the same outcome, in the order given.
pub fn dispatch_all(
    server: &ServerHandle,
    entries: Vec<PendingCall>,
    outcome: &CallOutcome,
) -> Vec<(CallId, DispatchReport)> {
    entries
        .into_iter()
        .map(|entry| {
            let id = entry.id;
            (id, dispatch(server, entry, outcome.clone()))
        })
        .collect()
}

fn outcome_kind(outcome: &CallOutcome) -> &'static str {
    match outcome {
        CallOutcome::Success(_) => "success",
        CallOutcome::Failure(_) => "failure",
        CallOutcome::ConnectionLost => "connection-lost",
        CallOutcome::TimedOut => "timed-out",
    }
}

/// Extracts a printable message from a panic payload.
///
/// `panic!("literal")` carries a `&'static str`, `panic!("{x}")` a `String`;
/// anything else falls back to a fixed description.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
