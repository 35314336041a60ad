//! Client sessions
//!
//! Per-connection state: identity, CURIE prefixes and subscribed topics.

pub mod client;
pub mod context;
pub mod prefixes;

pub use client::{ClientId, ClientState, SessionPhase};
pub use context::ClientContext;
pub use prefixes::PrefixTable;
