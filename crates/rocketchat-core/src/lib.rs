//! # rocketchat-core
//!
//! Shared library for the Rocket.Chat realtime client containing the DDP
//! frame codec, the correlation-id counter, and the typed shapes of the
//! method results the client understands.
//!
//! It has zero dependencies on sockets, async runtimes, or terminals.
//!
//! # Architecture overview (for beginners)
//!
//! Rocket.Chat exposes a "realtime API" speaking DDP (the Distributed Data
//! Protocol from Meteor).  Every remote procedure call is a JSON object sent
//! over a single WebSocket, tagged with an `id`.  The server answers some time
//! later with a `result` object echoing that `id`.  Many calls can be in
//! flight at once and answers may come back in any order.
//!
//! This crate (`rocketchat-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How frames look on the wire.  Outgoing method calls are
//!   encoded into JSON text; inbound text is decoded into a typed
//!   [`protocol::messages::InboundFrame`], and result frames carry a
//!   [`protocol::messages::DecodedResponse`] (success payload or error detail).
//!
//! - **`domain`** – The result shapes of the handful of methods the client
//!   calls (`login`, `browseChannels`, `loadHistory`) and the request builders that
//!   produce their parameter lists.

// Rust will look for each module in a subdirectory with the same name
// (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rocketchat_core::CallId` instead of `rocketchat_core::protocol::messages::CallId`.
pub use domain::auth::{resume_login_params, LoginResult};
pub use domain::channels::{BrowseChannelsRequest, BrowseResult, ChannelEntry, SearchUsersRequest};
pub use domain::history::{into_chronological, HistoryMessage, HistoryPage, LoadHistoryRequest};
pub use protocol::codec::{
    decode_frame, decode_result, encode_connect, encode_method_call, encode_pong, ProtocolError,
};
pub use protocol::messages::{CallId, DecodedResponse, ErrorDetail, InboundFrame};
pub use protocol::params::Param;
