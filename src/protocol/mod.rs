//! WAMP v1 wire protocol
//!
//! Message tags, envelope decoding and the typed messages the dispatcher
//! routes on. Byte-level framing belongs to the transport.

pub mod constants;
pub mod message;
pub mod value;

pub use message::{ClientMessage, Envelope, Exclude, MessageType, ServerMessage};
pub use value::ValueExt;
