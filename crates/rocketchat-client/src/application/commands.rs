//! The user-facing commands: list channels, search users, show history.
//!
//! A command issues one call, and its callback renders the result into a
//! [`TextSink`].  [`execute`] returns a [`oneshot::Receiver`] that fires once
//! the callback has finished, whatever the outcome, so the binary knows when
//! it may close the connection.
//!
//! # Output format
//!
//! ```text
//! channels / users   general (ID: GENERAL)
//! history            <alice> hello there (Tue Oct 20 09:15:02 2026)
//! any failure        browseChannels failed: Not allowed [403]
//! ```

use std::sync::Arc;

use chrono::{Local, TimeZone};
use rocketchat_core::domain::channels::{BROWSE_CHANNELS_METHOD, DEFAULT_BROWSE_LIMIT};
use rocketchat_core::domain::history::{DEFAULT_HISTORY_LIMIT, LOAD_HISTORY_METHOD};
use rocketchat_core::{
    BrowseChannelsRequest, BrowseResult, ChannelEntry, HistoryMessage, LoadHistoryRequest,
    SearchUsersRequest,
};
use tokio::sync::oneshot;

use crate::application::calls::{browse_channels, load_history, search_users};
use crate::application::dispatcher::CallFailure;
use crate::application::session::{ServerHandle, SessionError};
use crate::application::sink::TextSink;

/// One user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List public channels.
    Channels,
    /// Search the user directory for `text`.
    Users { text: String },
    /// Show the latest messages of a room in the window named `target`.
    History {
        target: String,
        /// Room id to load, when it differs from `target` (direct messages).
        room_id: Option<String>,
    },
}

/// Page sizes used by the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    pub browse_limit: u32,
    pub history_limit: u32,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            browse_limit: DEFAULT_BROWSE_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Issues the call behind `command`.
///
/// # Errors
///
/// Returns the [`SessionError`] from issuing the call; the receiver is then
/// never created and nothing is printed.
pub fn execute(
    command: &Command,
    server: &ServerHandle,
    sink: Arc<dyn TextSink>,
    options: &CommandOptions,
) -> Result<oneshot::Receiver<()>, SessionError> {
    let (done, finished) = oneshot::channel();

    match command {
        Command::Channels => {
            let request = BrowseChannelsRequest {
                limit: options.browse_limit,
                ..BrowseChannelsRequest::default()
            };
            browse_channels(
                server,
                &request,
                move |_server: &ServerHandle, result: Result<BrowseResult, CallFailure>| {
                    let outcome = render_directory(sink.as_ref(), result);
                    let _ = done.send(());
                    outcome
                },
            )?;
        }
        Command::Users { text } => {
            let mut request = SearchUsersRequest::new(text.as_str());
            request.limit = options.browse_limit;
            search_users(
                server,
                &request,
                move |_server: &ServerHandle, result: Result<BrowseResult, CallFailure>| {
                    let outcome = render_directory(sink.as_ref(), result);
                    let _ = done.send(());
                    outcome
                },
            )?;
        }
        Command::History { target, room_id } => {
            let rid = room_id.as_deref().unwrap_or(target);
            let request = LoadHistoryRequest::new(rid).with_limit(options.history_limit);
            load_history(
                server,
                &request,
                target.clone(),
                move |_server: &ServerHandle,
                      result: Result<Vec<HistoryMessage>, CallFailure>,
                      target: String| {
                    let outcome = match result {
                        Ok(messages) => {
                            for message in &messages {
                                sink.print(Some(target.as_str()), &render_history_line(message));
                            }
                            Ok(())
                        }
                        Err(failure) => {
                            report_failure(sink.as_ref(), Some(target.as_str()), LOAD_HISTORY_METHOD, failure)
                        }
                    };
                    let _ = done.send(());
                    outcome
                },
            )?;
        }
    }

    Ok(finished)
}

fn render_directory(sink: &dyn TextSink, result: Result<BrowseResult, CallFailure>) -> anyhow::Result<()> {
    match result {
        Ok(page) => {
            for entry in &page.results {
                sink.print(None, &render_entry(entry));
            }
            Ok(())
        }
        Err(failure) => report_failure(sink, None, BROWSE_CHANNELS_METHOD, failure),
    }
}

/// Prints the failure notice.  A malformed payload is also handed back as an
/// error so the dispatcher logs it.
fn report_failure(
    sink: &dyn TextSink,
    target: Option<&str>,
    method: &str,
    failure: CallFailure,
) -> anyhow::Result<()> {
    sink.print(target, &format!("{method} failed: {failure}"));
    if matches!(failure, CallFailure::MalformedPayload { .. }) {
        return Err(failure.into());
    }
    Ok(())
}

/// `"<display name> (ID: <id>)"`
pub fn render_entry(entry: &ChannelEntry) -> String {
    format!("{} (ID: {})", entry.display_name(), entry.id)
}

/// `"<username> text (local time)"`
pub fn render_history_line(message: &HistoryMessage) -> String {
    let when = message
        .timestamp_millis()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%c").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    format!("<{}> {} ({})", message.u.username, message.msg, when)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
