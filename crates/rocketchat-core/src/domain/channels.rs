//! Directory browsing through the `browseChannels` method.
//!
//! The same method serves both the channel directory and the user directory;
//! the `type` field of its single parameter object selects which one.
//!
//! ```text
//! → {"msg":"method","method":"browseChannels","id":"1","params":[{"page":0,"offset":0,"limit":100}]}
//! ← {"msg":"result","id":"1","result":{"results":[{"_id":"GENERAL","name":"general","fname":null}],"total":1}}
//! ```

use serde::Deserialize;

use crate::protocol::params::Param;

/// Method name shared by the channel and user directory searches.
pub const BROWSE_CHANNELS_METHOD: &str = "browseChannels";

/// Page size used when the caller does not choose one.
pub const DEFAULT_BROWSE_LIMIT: u32 = 100;

// ── Requests ──────────────────────────────────────────────────────────────────

/// Parameters for listing public channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseChannelsRequest {
    /// Zero-based page number.
    pub page: u32,
    /// Number of entries to skip.
    pub offset: u32,
    /// Maximum number of entries to return.
    pub limit: u32,
}

impl Default for BrowseChannelsRequest {
    fn default() -> Self {
        Self {
            page: 0,
            offset: 0,
            limit: DEFAULT_BROWSE_LIMIT,
        }
    }
}

impl BrowseChannelsRequest {
    /// Builds the ordered parameter list for the method call.
    pub fn to_params(&self) -> Vec<Param> {
        vec![Param::object([
            ("page", Param::from(self.page)),
            ("offset", Param::from(self.offset)),
            ("limit", Param::from(self.limit)),
        ])]
    }
}

/// Parameters for searching the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUsersRequest {
    /// Free text matched against usernames and display names.
    pub text: String,
    /// `"all"` searches every federated workspace, `"local"` only this one.
    pub workspace: String,
    /// Zero-based page number.
    pub page: u32,
    /// Number of entries to skip.
    pub offset: u32,
    /// Maximum number of entries to return.
    pub limit: u32,
}

impl SearchUsersRequest {
    /// Builds a request for `text` with the default workspace and paging.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            workspace: "all".to_string(),
            page: 0,
            offset: 0,
            limit: DEFAULT_BROWSE_LIMIT,
        }
    }

    /// Builds the ordered parameter list for the method call.
    pub fn to_params(&self) -> Vec<Param> {
        vec![Param::object([
            ("text", Param::from(self.text.as_str())),
            ("workspace", Param::from(self.workspace.as_str())),
            ("type", Param::from("users")),
            ("page", Param::from(self.page)),
            ("offset", Param::from(self.offset)),
            ("limit", Param::from(self.limit)),
        ])]
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// One row of a directory listing: a room or a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelEntry {
    /// Server-side identifier (room id or user id).
    #[serde(rename = "_id")]
    pub id: String,
    /// Short name (`general`) or, for users, the display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Friendly name of a room, when it differs from `name`.
    #[serde(default)]
    pub fname: Option<String>,
    /// Login name; only present for user rows.
    #[serde(default)]
    pub username: Option<String>,
}

impl ChannelEntry {
    /// The name to show a human: `fname` when set, else `name`, else `username`,
    /// else the id itself.
    pub fn display_name(&self) -> &str {
        self.fname
            .as_deref()
            .or(self.name.as_deref())
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
    }
}

/// The success payload of `browseChannels`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowseResult {
    /// Matching rows in server order.
    #[serde(default)]
    pub results: Vec<ChannelEntry>,
    /// Total number of matches across all pages, when the server reports it.
    #[serde(default)]
    pub total: Option<u64>,
}
