//! Protocol module containing frame types, the JSON codec, call parameters,
//! and the correlation-id counter.

pub mod codec;
pub mod messages;
pub mod params;
pub mod sequence;

pub use codec::{decode_frame, decode_result, encode_connect, encode_method_call, encode_pong, ProtocolError};
pub use messages::*;
pub use params::Param;
pub use sequence::CallIdCounter;
