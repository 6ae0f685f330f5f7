//! Typed helpers for the methods the client knows.
//!
//! Each helper builds the method's parameter list, issues the call through
//! [`ServerHandle::call`], and decodes the success payload into the matching
//! `rocketchat-core` type before the caller's callback sees it.  A payload
//! that does not have the expected shape reaches the callback as
//! [`CallFailure::MalformedPayload`].

use rocketchat_core::domain::auth::LOGIN_METHOD;
use rocketchat_core::domain::channels::BROWSE_CHANNELS_METHOD;
use rocketchat_core::domain::history::LOAD_HISTORY_METHOD;
use rocketchat_core::{
    resume_login_params, BrowseChannelsRequest, BrowseResult, CallId, HistoryMessage, HistoryPage,
    LoadHistoryRequest, LoginResult, SearchUsersRequest,
};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::application::dispatcher::{CallFailure, CallOutcome};
use crate::application::session::{ServerHandle, SessionError};

/// Turns an outcome into the typed success payload of `method`.
pub fn decode_payload<T: DeserializeOwned>(
    method: &str,
    outcome: CallOutcome,
) -> Result<T, CallFailure> {
    let value = outcome.into_result()?;
    serde_json::from_value(value).map_err(|e| CallFailure::MalformedPayload {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Authenticates with a resume (or personal access) token.
///
/// On success the user id is recorded on the session before `callback` runs.
pub fn login_with_token<F>(
    server: &ServerHandle,
    token: &str,
    callback: F,
) -> Result<CallId, SessionError>
where
    F: FnOnce(&ServerHandle, Result<LoginResult, CallFailure>) -> anyhow::Result<()>
        + Send
        + 'static,
{
    server.call(
        LOGIN_METHOD,
        &resume_login_params(token),
        move |server: &ServerHandle, outcome: CallOutcome| {
            let result = decode_payload::<LoginResult>(LOGIN_METHOD, outcome);
            if let Ok(login) = &result {
                info!(server = %server.name(), user_id = %login.id, "logged in");
                server.set_user_id(login.id.clone());
            }
            callback(server, result)
        },
    )
}

/// Lists public channels.
pub fn browse_channels<F>(
    server: &ServerHandle,
    request: &BrowseChannelsRequest,
    callback: F,
) -> Result<CallId, SessionError>
where
    F: FnOnce(&ServerHandle, Result<BrowseResult, CallFailure>) -> anyhow::Result<()>
        + Send
        + 'static,
{
    server.call(
        BROWSE_CHANNELS_METHOD,
        &request.to_params(),
        move |server: &ServerHandle, outcome: CallOutcome| {
            callback(server, decode_payload(BROWSE_CHANNELS_METHOD, outcome))
        },
    )
}

/// Searches the user directory.
pub fn search_users<F>(
    server: &ServerHandle,
    request: &SearchUsersRequest,
    callback: F,
) -> Result<CallId, SessionError>
where
    F: FnOnce(&ServerHandle, Result<BrowseResult, CallFailure>) -> anyhow::Result<()>
        + Send
        + 'static,
{
    server.call(
        BROWSE_CHANNELS_METHOD,
        &request.to_params(),
        move |server: &ServerHandle, outcome: CallOutcome| {
            callback(server, decode_payload(BROWSE_CHANNELS_METHOD, outcome))
        },
    )
}

/// Fetches one page of room history.
///
/// The server sends the page newest first; `callback` receives it oldest
/// first, together with `context` (typically the window to print into).
pub fn load_history<C, F>(
    server: &ServerHandle,
    request: &LoadHistoryRequest,
    context: C,
    callback: F,
) -> Result<CallId, SessionError>
where
    C: Send + 'static,
    F: FnOnce(&ServerHandle, Result<Vec<HistoryMessage>, CallFailure>, C) -> anyhow::Result<()>
        + Send
        + 'static,
{
    server.call_with_context(
        LOAD_HISTORY_METHOD,
        &request.to_params(),
        context,
        move |server: &ServerHandle, outcome: CallOutcome, context: C| {
            let messages = decode_payload::<HistoryPage>(LOAD_HISTORY_METHOD, outcome)
                .map(HistoryPage::into_chronological);
            callback(server, messages, context)
        },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::Session;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn session() -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new("test", tx), rx)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    fn reply(session: &Session, id: CallId, result: Value) {
        let frame = json!({"msg": "result", "id": id.to_string(), "result": result});
        session.on_frame_received(frame.to_string().as_bytes());
    }

    #[test]
    fn test_decode_payload_reports_shape_mismatch() {
        let result = decode_payload::<BrowseResult>("browseChannels", CallOutcome::Success(json!(42)));

        assert!(matches!(
            result,
            Err(CallFailure::MalformedPayload { ref method, .. }) if method == "browseChannels"
        ));
    }

    #[test]
    fn test_decode_payload_passes_failures_through() {
        let result = decode_payload::<BrowseResult>("browseChannels", CallOutcome::ConnectionLost);
        assert_eq!(result, Err(CallFailure::ConnectionLost));
    }

    #[test]
    fn test_browse_channels_delivers_typed_result() {
        // Arrange
        let (session, mut rx) = session();
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_cb = Arc::clone(&names);
        let id = browse_channels(
            session.handle(),
            &BrowseChannelsRequest::default(),
            move |_server: &ServerHandle, result: Result<BrowseResult, CallFailure>| {
                let result = result?;
                names_cb
                    .lock()
                    .unwrap()
                    .extend(result.results.iter().map(|e| e.display_name().to_string()));
                Ok(())
            },
        )
        .unwrap();

        // Act
        reply(
            &session,
            id,
            json!({"results": [{"_id": "abc", "name": "general", "fname": null}], "total": 1}),
        );

        // Assert
        let frame = sent(&mut rx);
        assert_eq!(frame["method"], "browseChannels");
        assert_eq!(frame["params"], json!([{"page": 0, "offset": 0, "limit": 100}]));
        assert_eq!(*names.lock().unwrap(), vec!["general".to_string()]);
    }

    #[test]
    fn test_search_users_sends_users_type() {
        let (session, mut rx) = session();

        search_users(
            session.handle(),
            &SearchUsersRequest::new("ali"),
            |_server: &ServerHandle, _result: Result<BrowseResult, CallFailure>| Ok(()),
        )
        .unwrap();

        let frame = sent(&mut rx);
        assert_eq!(frame["method"], "browseChannels");
        assert_eq!(frame["params"][0]["type"], "users");
        assert_eq!(frame["params"][0]["text"], "ali");
    }

    #[test]
    fn test_login_records_user_id() {
        // Arrange
        let (session, mut rx) = session();
        let ok = Arc::new(Mutex::new(false));
        let ok_cb = Arc::clone(&ok);
        let id = login_with_token(
            session.handle(),
            "t0k",
            move |_server: &ServerHandle, result: Result<LoginResult, CallFailure>| {
                *ok_cb.lock().unwrap() = result.is_ok();
                Ok(())
            },
        )
        .unwrap();

        // Act
        reply(&session, id, json!({"id": "u1", "token": "t0k", "tokenExpires": {"$date": 1}}));

        // Assert
        assert_eq!(sent(&mut rx)["params"], json!([{"resume": "t0k"}]));
        assert!(*ok.lock().unwrap());
        assert_eq!(session.handle().user_id(), Some("u1".to_string()));
    }

    #[test]
    fn test_failed_login_leaves_user_id_unset() {
        let (session, _rx) = session();
        let failure = Arc::new(Mutex::new(None));
        let failure_cb = Arc::clone(&failure);
        let id = login_with_token(
            session.handle(),
            "expired",
            move |_server: &ServerHandle, result: Result<LoginResult, CallFailure>| {
                *failure_cb.lock().unwrap() = result.err();
                Ok(())
            },
        )
        .unwrap();

        let frame = json!({"msg": "result", "id": id.to_string(), "error": {"error": 403, "reason": "You've been logged out by the server. Please log in again."}});
        session.on_frame_received(frame.to_string().as_bytes());

        assert!(matches!(*failure.lock().unwrap(), Some(CallFailure::Protocol(_))));
        assert_eq!(session.handle().user_id(), None);
    }

    #[test]
    fn test_load_history_reorders_and_returns_context() {
        // Arrange
        let (session, mut rx) = session();
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        let id = load_history(
            session.handle(),
            &LoadHistoryRequest::new("GENERAL"),
            "#general".to_string(),
            move |_server: &ServerHandle,
                  result: Result<Vec<HistoryMessage>, CallFailure>,
                  target: String| {
                let ids: Vec<String> = result?.into_iter().map(|m| m.id).collect();
                *seen_cb.lock().unwrap() = Some((target, ids));
                Ok(())
            },
        )
        .unwrap();

        // Act – newest first, as the server sends it
        reply(
            &session,
            id,
            json!({"messages": [
                {"_id": "m3", "msg": "c", "u": {"username": "bob"}, "ts": {"$date": 3000}},
                {"_id": "m2", "msg": "b", "u": {"username": "bob"}, "ts": {"$date": 2000}},
                {"_id": "m1", "msg": "a", "u": {"username": "ann"}, "ts": {"$date": 1000}}
            ]}),
        );

        // Assert
        assert_eq!(sent(&mut rx)["params"], json!(["GENERAL", null, 10, null]));
        assert_eq!(
            *seen.lock().unwrap(),
            Some((
                "#general".to_string(),
                vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]
            ))
        );
    }

    #[test]
    fn test_load_history_empty_page() {
        let (session, _rx) = session();
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        let id = load_history(
            session.handle(),
            &LoadHistoryRequest::new("GENERAL"),
            (),
            move |_server: &ServerHandle, result: Result<Vec<HistoryMessage>, CallFailure>, _: ()| {
                *seen_cb.lock().unwrap() = Some(result?.len());
                Ok(())
            },
        )
        .unwrap();

        reply(&session, id, json!({"messages": []}));

        assert_eq!(*seen.lock().unwrap(), Some(0));
    }

    #[test]
    fn test_helpers_refuse_after_disconnect() {
        let (session, _rx) = session();
        session.on_disconnect();

        let result = browse_channels(
            session.handle(),
            &BrowseChannelsRequest::default(),
            |_server: &ServerHandle, _result: Result<BrowseResult, CallFailure>| Ok(()),
        );

        assert_eq!(result, Err(SessionError::NotConnected));
    }
}
