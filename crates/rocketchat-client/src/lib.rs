//! rocketchat-client library crate.
//!
//! This crate drives Rocket.Chat's realtime API: it multiplexes many
//! concurrent method calls over one WebSocket, matches each `result` frame to
//! the call that caused it, and hands the decoded outcome to that call's
//! callback exactly once.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Command line (clap)
//!         ↓
//! [rocketchat-client]
//!   ├── application/
//!   │     ├── commands/   channels, users, history → text sink
//!   │     ├── calls/      typed helpers: login, browseChannels, loadHistory
//!   │     ├── session/    call(), on_frame_received(), on_disconnect()
//!   │     ├── registry/   correlation id → pending callback
//!   │     ├── dispatcher/ runs a callback once, contains its failures
//!   │     └── sink/       TextSink port for rendered output
//!   └── infrastructure/
//!         ├── transport/  WebSocket reader/writer tasks (tokio-tungstenite)
//!         ├── config/     TOML configuration file
//!         └── output/     stdout TextSink
//!         ↕
//! Rocket.Chat server  (DDP JSON frames over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `application` depends on `rocketchat-core` and an outbound frame channel
//!   only; it never touches a socket, so every path is testable in memory.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Application layer: call correlation, dispatch, and the user commands.
pub mod application;

/// Infrastructure layer: WebSocket transport, configuration, and output.
pub mod infrastructure;
