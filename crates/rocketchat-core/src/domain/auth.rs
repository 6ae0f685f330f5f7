//! Resume-token login through the `login` method.
//!
//! The realtime API accepts a previously issued auth token (a "resume" token,
//! or a personal access token) instead of a password:
//!
//! ```text
//! → {"msg":"method","method":"login","id":"1","params":[{"resume":"<token>"}]}
//! ← {"msg":"result","id":"1","result":{"id":"<user id>","token":"<token>","tokenExpires":{"$date":...}}}
//! ```

use serde::Deserialize;

use crate::domain::history::EjsonDate;
use crate::protocol::params::Param;

/// Method name for authentication.
pub const LOGIN_METHOD: &str = "login";

/// Builds the parameter list for a resume-token login.
pub fn resume_login_params(token: &str) -> Vec<Param> {
    vec![Param::object([("resume", Param::from(token))])]
}

/// The success payload of `login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResult {
    /// The authenticated user's id.
    pub id: String,
    /// The token to resume this session with next time.
    pub token: String,
    /// When `token` stops being accepted.
    #[serde(rename = "tokenExpires", default)]
    pub token_expires: Option<EjsonDate>,
}
