//! Domain types for the Rocket.Chat methods the client calls.
//!
//! This module contains pure data shapes with no infrastructure dependencies.
//!
//! # Why typed results? (for beginners)
//!
//! A DDP `result` is arbitrary JSON.  Reaching into it ad hoc
//! (`result["messages"][i]["u"]["username"]`) spreads knowledge of the server's
//! schema across every call site and turns a schema change into a silent
//! `null`.  Instead each method gets:
//!
//! - a **request** type that knows how to build the method's parameter list, and
//! - a **result** type that `serde` deserializes the success payload into.
//!
//! Code in outer layers (the client's session and commands) depends on these
//! types, but this module never depends on them.

/// `login` with a resume token.
pub mod auth;

/// `browseChannels` requests and results (channel and user directory).
pub mod channels;

/// `loadHistory` requests and results, plus chronological reordering.
pub mod history;
