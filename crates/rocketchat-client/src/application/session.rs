//! Connection session: one realtime connection's view of its calls.
//!
//! # Two faces of one session (for beginners)
//!
//! A [`Session`] is what the transport drives.  It is told about every inbound
//! frame ([`Session::on_frame_received`]) and about the end of the connection
//! ([`Session::on_disconnect`]).
//!
//! A [`ServerHandle`] is what user code holds.  It issues method calls
//! ([`ServerHandle::call`]) and is passed into every callback, so a callback
//! can chain a follow-up call on the same connection.
//!
//! Both share one [`Arc`]'d inner state:
//!
//! ```text
//!   user code ── ServerHandle::call() ──► registry.register() ──► outbound channel ──► writer task
//!                                                  ▲
//!   reader task ── Session::on_frame_received() ──┘ resolve() ──► dispatcher ──► callback
//! ```
//!
//! # State machine
//!
//! ```text
//! Handshaking ──connected──► Connected ──on_disconnect──► Closed
//!      │                                                    ▲
//!      └───────────────failed / on_disconnect───────────────┘
//! ```
//!
//! Calls may be issued while the handshake is still in flight; the server
//! processes frames in order, so the `connect` frame is always seen first.
//! Once `Closed`, every call is refused with [`SessionError::NotConnected`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rocketchat_core::{
    decode_frame, encode_connect, encode_method_call, encode_pong, CallId, InboundFrame, Param,
    ProtocolError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{dispatch, dispatch_all, CallOutcome, DispatchReport};
use crate::application::registry::{NotFound, PendingCallRegistry, RegisterError};

// ── Error type ────────────────────────────────────────────────────────────────

/// Why a call could not be issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The connection is closed (or closing); the callback will never run.
    #[error("not connected")]
    NotConnected,

    /// The connection has used up its correlation ids.
    #[error("correlation ids exhausted; reconnect to continue")]
    IdsExhausted,

    /// The call could not be encoded into a frame.
    #[error("failed to encode {method}: {reason}")]
    Encode { method: String, reason: String },
}

impl From<RegisterError> for SessionError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Closed => SessionError::NotConnected,
            RegisterError::IdsExhausted => SessionError::IdsExhausted,
        }
    }
}

fn encode_error(method: &str, e: ProtocolError) -> SessionError {
    SessionError::Encode {
        method: method.to_string(),
        reason: e.to_string(),
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// `connect` has been (or is about to be) sent; no answer yet.
    Handshaking,
    /// The server accepted the handshake.
    Connected {
        /// The DDP session id the server assigned, if it sent one.
        ddp_session: Option<String>,
    },
    /// Torn down; terminal.
    Closed,
}

/// What [`Session::on_frame_received`] did with a frame.
#[derive(Debug, PartialEq)]
pub enum InboundDisposition {
    /// A result frame matched a pending call and its callback ran.
    Dispatched { id: CallId, report: DispatchReport },
    /// A result frame whose id is not pending (duplicate, spurious, or expired).
    Unmatched(CallId),
    /// The frame could not be decoded; nothing was dispatched.
    Malformed(ProtocolError),
    /// The server accepted the handshake.
    Connected,
    /// The server refused the handshake; the session is now closed.
    HandshakeRejected { version: Option<String> },
    /// A ping (answered) or a pong.
    Keepalive,
    /// Any frame kind the client does not act on.
    Ignored,
}

struct SessionInner {
    name: String,
    /// Frames for the writer task.  Taken on disconnect so the writer ends.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    registry: PendingCallRegistry,
    state: Mutex<SessionState>,
    user_id: Mutex<Option<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ServerHandle ──────────────────────────────────────────────────────────────

/// Cheap, cloneable handle for issuing calls on one connection.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<SessionInner>,
}

impl ServerHandle {
    /// Label used in log messages (usually the server URL).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Issues a method call and remembers `callback` for its outcome.
    ///
    /// The entry is registered *before* the frame is handed to the writer, so
    /// a response can never arrive for an id the registry does not know.
    ///
    /// On `Ok(id)` the callback runs exactly once: with the server's answer,
    /// with [`CallOutcome::ConnectionLost`] if the connection ends first, or
    /// with [`CallOutcome::TimedOut`] if the timeout policy expires it.  On
    /// `Err` it never runs.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] once the session is closed.
    /// - [`SessionError::IdsExhausted`] when no correlation id is left.
    /// - [`SessionError::Encode`] if the parameters cannot be serialized.
    pub fn call<F>(&self, method: &str, params: &[Param], callback: F) -> Result<CallId, SessionError>
    where
        F: FnOnce(&ServerHandle, CallOutcome) -> anyhow::Result<()> + Send + 'static,
    {
        let registry = &self.inner.registry;
        let id = registry.register(method, Box::new(callback))?;

        let frame = match encode_method_call(id, method, params) {
            Ok(frame) => frame,
            Err(e) => {
                // Nothing was sent, so the entry can only still be ours.
                drop(registry.resolve(id));
                return Err(encode_error(method, e));
            }
        };

        if self.send(frame).is_err() {
            return match registry.resolve(id) {
                Ok(_unsent) => Err(SessionError::NotConnected),
                // Teardown already drained the entry and owns its outcome.
                Err(NotFound(_)) => Ok(id),
            };
        }

        debug!(server = %self.name(), call_id = %id, method, "call issued");
        Ok(id)
    }

    /// Like [`call`](Self::call), handing `context` back to the callback.
    ///
    /// Useful when the callback needs a value that belongs to the caller,
    /// such as the name of the window a result should be printed to.
    pub fn call_with_context<C, F>(
        &self,
        method: &str,
        params: &[Param],
        context: C,
        callback: F,
    ) -> Result<CallId, SessionError>
    where
        C: Send + 'static,
        F: FnOnce(&ServerHandle, CallOutcome, C) -> anyhow::Result<()> + Send + 'static,
    {
        self.call(method, params, move |server: &ServerHandle, outcome: CallOutcome| {
            callback(server, outcome, context)
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        lock(&self.inner.state).clone()
    }

    /// `true` once the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    /// Number of calls still waiting for an outcome.
    pub fn pending_calls(&self) -> usize {
        self.inner.registry.len()
    }

    /// Id of the logged-in user, once a login succeeded.
    pub fn user_id(&self) -> Option<String> {
        lock(&self.inner.user_id).clone()
    }

    /// Records the logged-in user's id.
    pub fn set_user_id(&self, id: impl Into<String>) {
        *lock(&self.inner.user_id) = Some(id.into());
    }

    fn send(&self, frame: String) -> Result<(), SessionError> {
        let outbound = lock(&self.inner.outbound);
        match outbound.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| SessionError::NotConnected),
            None => Err(SessionError::NotConnected),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// The transport-facing side of a connection.
#[derive(Clone)]
pub struct Session {
    handle: ServerHandle,
}

impl Session {
    /// Creates a session in the [`SessionState::Handshaking`] state.
    ///
    /// `outbound` receives every frame the session wants written, as JSON text.
    pub fn new(name: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            handle: ServerHandle {
                inner: Arc::new(SessionInner {
                    name: name.into(),
                    outbound: Mutex::new(Some(outbound)),
                    registry: PendingCallRegistry::new(),
                    state: Mutex::new(SessionState::Handshaking),
                    user_id: Mutex::new(None),
                }),
            },
        }
    }

    /// The call-issuing handle for this session.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Queues the `connect` frame.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] if the session is already closed.
    pub fn start_handshake(&self) -> Result<(), SessionError> {
        let frame = encode_connect().map_err(|e| encode_error("connect", e))?;
        self.handle.send(frame)?;
        debug!(server = %self.handle.name(), "handshake sent");
        Ok(())
    }

    /// Handles one inbound frame.
    ///
    /// Never fails: malformed frames and unmatched results are logged and
    /// reported in the returned disposition, and the connection carries on.
    pub fn on_frame_received(&self, raw: &[u8]) -> InboundDisposition {
        let server = &self.handle;
        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(server = %server.name(), "dropping malformed frame: {e}");
                return InboundDisposition::Malformed(e);
            }
        };

        match frame {
            InboundFrame::Result { id, response } => match server.inner.registry.resolve(id) {
                Ok(entry) => {
                    let report = dispatch(server, entry, CallOutcome::from(response));
                    InboundDisposition::Dispatched { id, report }
                }
                Err(NotFound(id)) => {
                    warn!(server = %server.name(), call_id = %id, "result for unknown call id");
                    InboundDisposition::Unmatched(id)
                }
            },
            InboundFrame::Connected { session } => {
                let mut state = lock(&server.inner.state);
                if *state != SessionState::Closed {
                    info!(server = %server.name(), ddp_session = ?session, "connected");
                    *state = SessionState::Connected { ddp_session: session };
                }
                InboundDisposition::Connected
            }
            InboundFrame::Failed { version } => {
                warn!(server = %server.name(), suggested = ?version, "server rejected DDP handshake");
                self.on_disconnect();
                InboundDisposition::HandshakeRejected { version }
            }
            InboundFrame::Ping { id } => {
                match encode_pong(id.as_deref()) {
                    Ok(pong) => {
                        if server.send(pong).is_err() {
                            debug!(server = %server.name(), "ping after close; no pong sent");
                        }
                    }
                    Err(e) => warn!(server = %server.name(), "failed to encode pong: {e}"),
                }
                InboundDisposition::Keepalive
            }
            InboundFrame::Pong => InboundDisposition::Keepalive,
            InboundFrame::Other { msg } => {
                debug!(server = %server.name(), msg = ?msg, "ignoring frame");
                InboundDisposition::Ignored
            }
        }
    }

    /// Tears the session down and fails every pending call.
    ///
    /// Each outstanding callback runs once with
    /// [`CallOutcome::ConnectionLost`], in issuance order.  Returns how many
    /// there were.  Calling this again is harmless and returns 0.
    pub fn on_disconnect(&self) -> usize {
        let server = &self.handle;
        *lock(&server.inner.state) = SessionState::Closed;
        // Dropping the sender lets the writer task finish.
        lock(&server.inner.outbound).take();

        let entries = server.inner.registry.discard_all();
        let count = entries.len();
        if count > 0 {
            info!(server = %server.name(), pending = count, "connection lost; failing pending calls");
        }
        dispatch_all(server, entries, &CallOutcome::ConnectionLost);
        count
    }

    /// Fails every call older than `timeout` with [`CallOutcome::TimedOut`].
    ///
    /// Returns how many calls were expired.
    pub fn expire_stale(&self, timeout: Duration) -> usize {
        self.expire_stale_at(timeout, Instant::now())
    }

    /// Like [`expire_stale`](Self::expire_stale) with an explicit "now".
    pub fn expire_stale_at(&self, timeout: Duration, now: Instant) -> usize {
        let server = &self.handle;
        let expired = server.inner.registry.expire_stale(timeout, now);
        let count = expired.len();
        for entry in &expired {
            warn!(server = %server.name(), call_id = %entry.id, method = %entry.method, "call timed out");
        }
        dispatch_all(server, expired, &CallOutcome::TimedOut);
        count
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn session() -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new("test", tx), rx)
    }

    fn recorder() -> (
        Arc<Mutex<Vec<CallOutcome>>>,
        impl FnOnce(&ServerHandle, CallOutcome) -> anyhow::Result<()> + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |_server: &ServerHandle, outcome: CallOutcome| {
            sink.lock().unwrap().push(outcome);
            Ok(())
        })
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let text = rx.try_recv().expect("a frame should have been sent");
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_start_handshake_sends_connect() {
        let (session, mut rx) = session();

        session.start_handshake().unwrap();

        assert_eq!(sent(&mut rx), json!({"msg": "connect", "version": "1", "support": ["1"]}));
        assert_eq!(session.handle().state(), SessionState::Handshaking);
    }

    #[test]
    fn test_call_sends_method_frame_and_registers() {
        // Arrange
        let (session, mut rx) = session();
        let (_seen, cb) = recorder();

        // Act
        let id = session
            .handle()
            .call("getRoomRoles", &[Param::from("GENERAL")], cb)
            .unwrap();

        // Assert
        assert_eq!(
            sent(&mut rx),
            json!({"msg": "method", "method": "getRoomRoles", "id": id.to_string(), "params": ["GENERAL"]})
        );
        assert_eq!(session.handle().pending_calls(), 1);
    }

    #[test]
    fn test_result_frame_dispatches_once() {
        // Arrange
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        let id = session.handle().call("m", &[], cb).unwrap();
        let frame = format!(r#"{{"msg":"result","id":"{id}","result":{{"ok":1}}}}"#);

        // Act
        let first = session.on_frame_received(frame.as_bytes());
        let second = session.on_frame_received(frame.as_bytes());

        // Assert
        assert_eq!(
            first,
            InboundDisposition::Dispatched {
                id,
                report: DispatchReport::Delivered
            }
        );
        assert_eq!(second, InboundDisposition::Unmatched(id));
        assert_eq!(*seen.lock().unwrap(), vec![CallOutcome::Success(json!({"ok": 1}))]);
        assert_eq!(session.handle().pending_calls(), 0);
    }

    #[test]
    fn test_error_frame_dispatches_failure() {
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        let id = session.handle().call("m", &[], cb).unwrap();
        let frame = format!(r#"{{"msg":"result","id":"{id}","error":{{"error":403,"reason":"Not allowed"}}}}"#);

        session.on_frame_received(frame.as_bytes());

        let seen = seen.lock().unwrap();
        match seen.as_slice() {
            [CallOutcome::Failure(detail)] => {
                assert_eq!(detail.reason.as_deref(), Some("Not allowed"));
                assert_eq!(detail.code.as_deref(), Some("403"));
            }
            other => panic!("expected one failure, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_does_not_disturb_pending_calls() {
        // Arrange
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        let id = session.handle().call("m", &[], cb).unwrap();

        // Act
        let bad = session.on_frame_received(b"{not json");
        let good = session.on_frame_received(format!(r#"{{"msg":"result","id":"{id}"}}"#).as_bytes());

        // Assert
        assert!(matches!(bad, InboundDisposition::Malformed(ProtocolError::Json(_))));
        assert!(matches!(good, InboundDisposition::Dispatched { .. }));
        assert_eq!(*seen.lock().unwrap(), vec![CallOutcome::Success(Value::Null)]);
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let (session, mut rx) = session();

        let disposition = session.on_frame_received(br#"{"msg":"ping","id":"k1"}"#);

        assert_eq!(disposition, InboundDisposition::Keepalive);
        assert_eq!(sent(&mut rx), json!({"msg": "pong", "id": "k1"}));
    }

    #[test]
    fn test_ping_without_id_gets_bare_pong() {
        let (session, mut rx) = session();

        session.on_frame_received(br#"{"msg":"ping"}"#);

        assert_eq!(sent(&mut rx), json!({"msg": "pong"}));
    }

    #[test]
    fn test_connected_frame_updates_state() {
        let (session, _rx) = session();

        let disposition = session.on_frame_received(br#"{"msg":"connected","session":"s-1"}"#);

        assert_eq!(disposition, InboundDisposition::Connected);
        assert_eq!(
            session.handle().state(),
            SessionState::Connected {
                ddp_session: Some("s-1".to_string())
            }
        );
    }

    #[test]
    fn test_failed_handshake_closes_and_fails_pending() {
        // Arrange
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        session.handle().call("m", &[], cb).unwrap();

        // Act
        let disposition = session.on_frame_received(br#"{"msg":"failed","version":"pre2"}"#);

        // Assert
        assert_eq!(
            disposition,
            InboundDisposition::HandshakeRejected {
                version: Some("pre2".to_string())
            }
        );
        assert!(session.handle().is_closed());
        assert_eq!(*seen.lock().unwrap(), vec![CallOutcome::ConnectionLost]);
    }

    #[test]
    fn test_other_frames_are_ignored() {
        let (session, _rx) = session();
        assert_eq!(
            session.on_frame_received(br#"{"msg":"added","collection":"users"}"#),
            InboundDisposition::Ignored
        );
        assert_eq!(
            session.on_frame_received(br#"{"server_id":"0"}"#),
            InboundDisposition::Ignored
        );
    }

    #[test]
    fn test_disconnect_fails_every_pending_call_once() {
        // Arrange
        let (session, _rx) = session();
        let mut records = Vec::new();
        for _ in 0..4 {
            let (seen, cb) = recorder();
            session.handle().call("m", &[], cb).unwrap();
            records.push(seen);
        }

        // Act
        let first = session.on_disconnect();
        let second = session.on_disconnect();

        // Assert
        assert_eq!(first, 4);
        assert_eq!(second, 0);
        for seen in records {
            assert_eq!(*seen.lock().unwrap(), vec![CallOutcome::ConnectionLost]);
        }
        assert_eq!(session.handle().pending_calls(), 0);
        assert_eq!(session.handle().state(), SessionState::Closed);
    }

    #[test]
    fn test_call_after_disconnect_is_refused() {
        let (session, _rx) = session();
        session.on_disconnect();

        let (seen, cb) = recorder();
        let result = session.handle().call("m", &[], cb);

        assert_eq!(result, Err(SessionError::NotConnected));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_call_with_dropped_writer_is_refused_and_not_left_pending() {
        // Arrange – the writer side has gone away
        let (session, rx) = session();
        drop(rx);
        let (seen, cb) = recorder();

        // Act
        let result = session.handle().call("m", &[], cb);

        // Assert
        assert_eq!(result, Err(SessionError::NotConnected));
        assert_eq!(session.handle().pending_calls(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_callback_can_issue_follow_up_call() {
        // Arrange
        let (session, mut rx) = session();
        let follow_up = Arc::new(Mutex::new(None));
        let follow_up_cb = Arc::clone(&follow_up);
        let id = session
            .handle()
            .call("first", &[], move |server: &ServerHandle, _outcome: CallOutcome| {
                let id = server.call("second", &[], |_s: &ServerHandle, _o: CallOutcome| Ok(()))?;
                *follow_up_cb.lock().unwrap() = Some(id);
                Ok(())
            })
            .unwrap();
        rx.try_recv().unwrap();

        // Act
        session.on_frame_received(format!(r#"{{"msg":"result","id":"{id}","result":null}}"#).as_bytes());

        // Assert
        let second = follow_up.lock().unwrap().expect("follow-up call issued");
        assert!(second > id);
        assert_eq!(sent(&mut rx)["method"], "second");
        assert_eq!(session.handle().pending_calls(), 1);
    }

    #[test]
    fn test_call_with_context_hands_context_back() {
        let (session, _rx) = session();
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        let id = session
            .handle()
            .call_with_context(
                "m",
                &[],
                String::from("#general"),
                move |_server: &ServerHandle, outcome: CallOutcome, target: String| {
                    *seen_cb.lock().unwrap() = Some((target, outcome));
                    Ok(())
                },
            )
            .unwrap();

        session.on_frame_received(format!(r#"{{"msg":"result","id":"{id}","result":7}}"#).as_bytes());

        assert_eq!(
            *seen.lock().unwrap(),
            Some(("#general".to_string(), CallOutcome::Success(json!(7))))
        );
    }

    #[test]
    fn test_expire_stale_times_out_old_calls() {
        // Arrange
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        let id = session.handle().call("slow", &[], cb).unwrap();

        // Act
        let expired = session.expire_stale_at(Duration::from_secs(1), Instant::now() + Duration::from_secs(5));

        // Assert
        assert_eq!(expired, 1);
        assert_eq!(*seen.lock().unwrap(), vec![CallOutcome::TimedOut]);
        let late = session.on_frame_received(format!(r#"{{"msg":"result","id":"{id}","result":1}}"#).as_bytes());
        assert_eq!(late, InboundDisposition::Unmatched(id));
    }

    #[test]
    fn test_expire_stale_keeps_young_calls() {
        let (session, _rx) = session();
        let (seen, cb) = recorder();
        session.handle().call("m", &[], cb).unwrap();

        assert_eq!(session.expire_stale(Duration::from_secs(60)), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(session.handle().pending_calls(), 1);
    }

    #[test]
    fn test_user_id_round_trip() {
        let (session, _rx) = session();
        assert_eq!(session.handle().user_id(), None);
        session.handle().set_user_id("u1");
        assert_eq!(session.handle().user_id(), Some("u1".to_string()));
    }
}
