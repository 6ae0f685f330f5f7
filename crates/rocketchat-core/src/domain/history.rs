//! Room history backfill through the `loadHistory` method.
//!
//! ```text
//! → {"msg":"method","method":"loadHistory","id":"4","params":["GENERAL",null,10,null]}
//! ← {"msg":"result","id":"4","result":{"messages":[{newest}, ..., {oldest}],"unreadNotLoaded":0}}
//! ```
//!
//! # Ordering contract
//!
//! The server returns a page **newest first**.  A chat window shows messages
//! oldest first, so the page must be reversed before display.  The reversal
//! relies only on the order the server sent; it does not sort by `ts`, because
//! the server's ordering is the one guarantee the client has.

use serde::Deserialize;

use crate::protocol::params::Param;

/// Method name for history backfill.
pub const LOAD_HISTORY_METHOD: &str = "loadHistory";

/// Number of messages fetched when the caller does not choose a page size.
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

// ── Request ───────────────────────────────────────────────────────────────────

/// Parameters for one page of room history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadHistoryRequest {
    /// Room id (`rid`), e.g. `GENERAL` or a direct-message room id.
    pub room_id: String,
    /// Only return messages older than this instant (Unix milliseconds).
    /// `None` starts from the newest message.
    pub end_millis: Option<i64>,
    /// Maximum number of messages to return.
    pub limit: u32,
    /// Only return messages updated after this instant (Unix milliseconds).
    pub last_update_millis: Option<i64>,
}

impl LoadHistoryRequest {
    /// Builds a request for the newest page of `room_id`.
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            end_millis: None,
            limit: DEFAULT_HISTORY_LIMIT,
            last_update_millis: None,
        }
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Builds the positional parameter list `[rid, end, limit, lastUpdate]`.
    ///
    /// Instants are encoded as EJSON dates (`{"$date": millis}`) and absent
    /// instants as `null`.
    pub fn to_params(&self) -> Vec<Param> {
        vec![
            Param::from(self.room_id.as_str()),
            ejson_date(self.end_millis),
            Param::from(self.limit),
            ejson_date(self.last_update_millis),
        ]
    }
}

fn ejson_date(millis: Option<i64>) -> Param {
    match millis {
        Some(ms) => Param::object([("$date", Param::Int(ms))]),
        None => Param::Null,
    }
}

// ── Result ────────────────────────────────────────────────────────────────────

/// An EJSON date: `{"$date": <Unix milliseconds>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EjsonDate {
    #[serde(rename = "$date")]
    pub millis: i64,
}

/// The author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageAuthor {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One message of a history page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub rid: Option<String>,
    /// Raw message text (markdown, mentions and emoji unexpanded).
    #[serde(default)]
    pub msg: String,
    /// System message type (`uj` = user joined, ...); absent for chat text.
    #[serde(default)]
    pub t: Option<String>,
    pub u: MessageAuthor,
    #[serde(default)]
    pub ts: Option<EjsonDate>,
}

impl HistoryMessage {
    /// Creation time in Unix milliseconds, if the server sent one.
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.ts.map(|d| d.millis)
    }
}

/// The success payload of `loadHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryPage {
    /// Messages, newest first, exactly as the server sent them.
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    /// Count of unread messages older than this page.
    #[serde(rename = "unreadNotLoaded", default)]
    pub unread_not_loaded: Option<u64>,
}

impl HistoryPage {
    /// Consumes the page and returns its messages oldest first.
    pub fn into_chronological(self) -> Vec<HistoryMessage> {
        into_chronological(self.messages)
    }
}

/// Turns a newest-first sequence into oldest-first display order.
///
/// This is a pure reversal of arrival order: elements are never compared, so
/// ties or missing timestamps cannot reorder anything.  An empty input yields
/// an empty output.
///
/// ```rust
/// use rocketchat_core::into_chronological;
///
/// assert_eq!(into_chronological(vec![3, 2, 1]), vec![1, 2, 3]);
/// assert!(into_chronological(Vec::<u8>::new()).is_empty());
/// ```
pub fn into_chronological<T>(mut newest_first: Vec<T>) -> Vec<T> {
    newest_first.reverse();
    newest_first
}
