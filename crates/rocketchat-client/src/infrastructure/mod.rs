//! Infrastructure layer for rocketchat-client.
//!
//! The infrastructure layer handles all I/O: the WebSocket to the server,
//! the configuration file, and the terminal.
//!
//! # Responsibilities
//!
//! - Opening the WebSocket and running its reader, writer, and sweeper tasks
//! - Reading the TOML configuration file
//! - Printing rendered lines to stdout
//!
//! # What does NOT belong here?
//!
//! - Call correlation and callback dispatch (that is the application layer)
//! - Frame encoding and decoding (that is `rocketchat-core`)

pub mod config;
pub mod output;
pub mod transport;

// Re-export the primary entry points so `main.rs` can use them concisely.
pub use config::{ClientConfig, ConfigError};
pub use output::StdoutSink;
pub use transport::{Connection, TimeoutPolicy};
