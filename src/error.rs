//! Error types
//!
//! Protocol violations are recoverable: the dispatcher returns them, the
//! connection logs and drops the offending message, and keeps running.

use crate::protocol::MessageType;
use crate::session::ClientId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A client sent something the dispatcher cannot interpret
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// An RPC reply could not be delivered
    #[error("reply rejected: {0}")]
    Reply(#[from] ReplyError),

    /// `max_connections` sessions are already active
    #[error("connection limit reached")]
    ConnectionLimit,

    /// The handler refused the connection
    #[error("connection rejected: {0}")]
    ConnectionRejected(ClientId),

    /// A session with this identity is already connected
    #[error("duplicate client id: {0}")]
    DuplicateClient(ClientId),

    /// Envelope text was not valid JSON
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Malformed or unknown messages
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// Type tag outside the WAMP v1 range
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),

    /// Known tag that only the server may emit (WELCOME, CALL_RESULT, ...)
    #[error("unexpected {0:?} message from client")]
    UnexpectedMessageType(MessageType),

    /// Not an array, or the first element is not an integer tag
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Too few arguments for the message type
    #[error("{message_type:?} expects at least {expected} arguments, got {actual}")]
    Arity {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },

    /// Argument present but of the wrong shape
    #[error("{message_type:?} argument {position}: {reason}")]
    InvalidArgument {
        message_type: MessageType,
        position: usize,
        reason: &'static str,
    },
}

/// Failures when answering a CALL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    /// The responder already sent its single reply
    #[error("call {call_id} already answered")]
    DoubleReply { call_id: serde_json::Value },

    /// The caller disconnected before the reply was produced
    #[error("client {0} is gone")]
    ClientGone(ClientId),
}
