//! TOML configuration file for the client.
//!
//! Every field has a default, so an absent file, an empty file, and a file
//! that sets a single key are all valid.  Command-line flags override
//! whatever the file says (see `main.rs`).
//!
//! ```toml
//! log_level = "warn"
//!
//! [server]
//! url = "wss://open.rocket.chat/websocket"
//! token = "..."            # optional resume token
//!
//! [session]
//! call_timeout_secs = 30   # optional; absent disables expiry
//! sweep_interval_ms = 500
//!
//! [commands]
//! history_limit = 10
//! browse_limit = 100
//! ```
//!
//! # Serde default values
//!
//! `#[serde(default = "some_fn")]` fills a missing field with `some_fn()`;
//! `#[serde(default)]` on a struct-typed field fills the whole section from
//! that type's `Default` impl.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rocketchat_core::domain::channels::DEFAULT_BROWSE_LIMIT;
use rocketchat_core::domain::history::DEFAULT_HISTORY_LIMIT;
use serde::Deserialize;
use thiserror::Error;

use crate::application::commands::CommandOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// Which server to talk to and how to authenticate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. `wss://chat.example.com/websocket`.
    #[serde(default)]
    pub url: Option<String>,
    /// Resume or personal access token.  Without one, only anonymous
    /// methods can be called.
    #[serde(default)]
    pub token: Option<String>,
}

/// Call timeout policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Fail calls still pending after this many seconds.  Absent means calls
    /// wait until the connection closes.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
    /// How often the timeout sweeper runs.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Page sizes for the commands.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CommandsConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    #[serde(default = "default_browse_limit")]
    pub browse_limit: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "warn".to_string()
}
fn default_sweep_interval_ms() -> u64 {
    500
}
fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}
fn default_browse_limit() -> u32 {
    DEFAULT_BROWSE_LIMIT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            commands: CommandsConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: None,
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            browse_limit: default_browse_limit(),
        }
    }
}

impl SessionConfig {
    /// The call timeout, if one is configured.  Zero counts as "none".
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The sweeper period, never shorter than 10 ms.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }
}

impl From<&CommandsConfig> for CommandOptions {
    fn from(c: &CommandsConfig) -> Self {
        CommandOptions {
            browse_limit: c.browse_limit,
            history_limit: c.history_limit,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed or a value has
    /// the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read (including when
    /// it does not exist: a path given explicitly must exist), and
    /// [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
