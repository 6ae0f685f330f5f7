//! Application layer for rocketchat-client.
//!
//! The application layer knows *what* happens to a method call from the
//! moment it is issued until its callback has run, but delegates *how* bytes
//! reach the server to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Allocating correlation ids and remembering each call's callback
//! - Matching inbound frames to pending calls
//! - Running each callback exactly once and containing its failures
//! - Failing every pending call when the connection goes away
//! - Building typed requests and rendering typed results for the commands
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or WebSocket framing (that is infrastructure)
//! - Reading configuration files or command-line arguments

pub mod calls;
pub mod commands;
pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod sink;

pub use dispatcher::{dispatch, CallFailure, CallOutcome, DispatchReport};
pub use registry::{NotFound, PendingCall, PendingCallRegistry, RegisterError};
pub use session::{InboundDisposition, ServerHandle, Session, SessionError, SessionState};
pub use sink::{RecordingSink, TextSink};
