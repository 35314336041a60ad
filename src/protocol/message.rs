//! WAMP v1 messages
//!
//! An [`Envelope`] is the loosely typed form delivered by the transport:
//! a type tag plus an ordered argument list. [`ClientMessage`] is the
//! validated form the dispatcher routes on; [`ServerMessage`] covers
//! everything the server emits.

use std::collections::HashSet;

use bytes::Bytes;
use serde_json::{json, Value};

use super::constants::*;
use super::value::ValueExt;
use crate::error::ProtocolError;
use crate::session::ClientId;

/// Message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Welcome,
    Prefix,
    Call,
    CallResult,
    CallError,
    Subscribe,
    Unsubscribe,
    Publish,
    Event,
}

impl MessageType {
    /// Wire tag for this type
    pub fn type_id(self) -> u64 {
        match self {
            MessageType::Welcome => TYPE_ID_WELCOME,
            MessageType::Prefix => TYPE_ID_PREFIX,
            MessageType::Call => TYPE_ID_CALL,
            MessageType::CallResult => TYPE_ID_CALL_RESULT,
            MessageType::CallError => TYPE_ID_CALL_ERROR,
            MessageType::Subscribe => TYPE_ID_SUBSCRIBE,
            MessageType::Unsubscribe => TYPE_ID_UNSUBSCRIBE,
            MessageType::Publish => TYPE_ID_PUBLISH,
            MessageType::Event => TYPE_ID_EVENT,
        }
    }

    /// Look up a type by wire tag
    pub fn from_type_id(id: u64) -> Option<Self> {
        let ty = match id {
            TYPE_ID_WELCOME => MessageType::Welcome,
            TYPE_ID_PREFIX => MessageType::Prefix,
            TYPE_ID_CALL => MessageType::Call,
            TYPE_ID_CALL_RESULT => MessageType::CallResult,
            TYPE_ID_CALL_ERROR => MessageType::CallError,
            TYPE_ID_SUBSCRIBE => MessageType::Subscribe,
            TYPE_ID_UNSUBSCRIBE => MessageType::Unsubscribe,
            TYPE_ID_PUBLISH => MessageType::Publish,
            TYPE_ID_EVENT => MessageType::Event,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether the server interprets this type when a client sends it
    pub fn is_client_message(self) -> bool {
        matches!(
            self,
            MessageType::Prefix
                | MessageType::Call
                | MessageType::Subscribe
                | MessageType::Unsubscribe
                | MessageType::Publish
        )
    }
}

impl TryFrom<u64> for MessageType {
    type Error = ProtocolError;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Self::from_type_id(id).ok_or(ProtocolError::UnknownMessageType(id))
    }
}

/// Decoded envelope: type tag and ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message_type: MessageType,
    pub args: Vec<Value>,
}

impl Envelope {
    /// Create an envelope
    pub fn new(message_type: MessageType, args: Vec<Value>) -> Self {
        Self { message_type, args }
    }

    /// Build from a decoded JSON array `[typeId, arg0, arg1, ...]`
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(mut items) = value else {
            return Err(ProtocolError::InvalidEnvelope("not an array".into()));
        };
        if items.is_empty() {
            return Err(ProtocolError::InvalidEnvelope("empty array".into()));
        }

        let tag = items
            .remove(0)
            .as_u64()
            .ok_or_else(|| ProtocolError::InvalidEnvelope("type id is not an integer".into()))?;
        let message_type = MessageType::try_from(tag)?;

        Ok(Self::new(message_type, items))
    }

    /// Parse JSON text into an envelope
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value)?)
    }

    /// Convert back to the JSON array form
    pub fn into_value(self) -> Value {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(Value::from(self.message_type.type_id()));
        items.extend(self.args);
        Value::Array(items)
    }
}

/// Who a PUBLISH should not be delivered to
///
/// Normalized from the optional third PUBLISH argument:
/// - omitted: the publisher is excluded
/// - an array: exactly the listed sessions are excluded
/// - any other truthy value: the publisher is excluded
/// - any other falsy value: nobody is excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclude {
    Publisher,
    Nobody,
    Clients(Vec<ClientId>),
}

impl Exclude {
    /// Normalize the raw `exclude` argument
    pub fn from_arg(arg: Option<&Value>) -> Self {
        let Some(arg) = arg else {
            return Exclude::Publisher;
        };
        if let Some(ids) = arg.as_client_ids() {
            Exclude::Clients(ids)
        } else if arg.is_truthy() {
            Exclude::Publisher
        } else {
            Exclude::Nobody
        }
    }

    /// Effective exclusion set for a given publisher
    pub fn to_set(&self, publisher: &ClientId) -> HashSet<ClientId> {
        match self {
            Exclude::Publisher => HashSet::from([publisher.clone()]),
            Exclude::Nobody => HashSet::new(),
            Exclude::Clients(ids) => ids.iter().cloned().collect(),
        }
    }
}

/// A validated message from a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Prefix {
        prefix: String,
        uri: String,
    },
    Call {
        /// Any JSON value; echoed back unchanged in the reply
        call_id: Value,
        proc_uri: String,
        args: Vec<Value>,
    },
    Subscribe {
        topic: String,
        args: Vec<Value>,
    },
    Unsubscribe {
        /// `None` means unsubscribe from every topic
        topic: Option<String>,
        args: Vec<Value>,
    },
    Publish {
        topic: String,
        event: Value,
        exclude: Exclude,
        eligible: Option<Vec<ClientId>>,
        args: Vec<Value>,
    },
}

impl ClientMessage {
    /// Message type of this message
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::Prefix { .. } => MessageType::Prefix,
            ClientMessage::Call { .. } => MessageType::Call,
            ClientMessage::Subscribe { .. } => MessageType::Subscribe,
            ClientMessage::Unsubscribe { .. } => MessageType::Unsubscribe,
            ClientMessage::Publish { .. } => MessageType::Publish,
        }
    }
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let ty = envelope.message_type;
        let arity = |expected: usize| {
            if envelope.args.len() < expected {
                Err(ProtocolError::Arity {
                    message_type: ty,
                    expected,
                    actual: envelope.args.len(),
                })
            } else {
                Ok(())
            }
        };

        match ty {
            MessageType::Prefix => arity(2)?,
            MessageType::Call => arity(2)?,
            MessageType::Subscribe => arity(1)?,
            MessageType::Unsubscribe => {}
            MessageType::Publish => arity(2)?,
            other => return Err(ProtocolError::UnexpectedMessageType(other)),
        }

        let mut args = envelope.args.into_iter();

        let message = match ty {
            MessageType::Prefix => ClientMessage::Prefix {
                prefix: string_arg(ty, 0, args.next())?,
                uri: string_arg(ty, 1, args.next())?,
            },
            MessageType::Call => ClientMessage::Call {
                call_id: args.next().unwrap_or(Value::Null),
                proc_uri: string_arg(ty, 1, args.next())?,
                args: args.collect(),
            },
            MessageType::Subscribe => ClientMessage::Subscribe {
                topic: string_arg(ty, 0, args.next())?,
                args: args.collect(),
            },
            MessageType::Unsubscribe => {
                let topic = match args.next() {
                    Some(Value::String(s)) if !s.is_empty() => Some(s),
                    Some(v) if v.is_truthy() => {
                        return Err(ProtocolError::InvalidArgument {
                            message_type: ty,
                            position: 0,
                            reason: "topic must be a string",
                        })
                    }
                    _ => None,
                };
                ClientMessage::Unsubscribe {
                    topic,
                    args: args.collect(),
                }
            }
            MessageType::Publish => {
                let topic = string_arg(ty, 0, args.next())?;
                let event = args.next().unwrap_or(Value::Null);
                let exclude = Exclude::from_arg(args.next().as_ref());
                let eligible = args.next().and_then(|v| v.as_client_ids());
                ClientMessage::Publish {
                    topic,
                    event,
                    exclude,
                    eligible,
                    args: args.collect(),
                }
            }
            _ => unreachable!("rejected above"),
        };

        Ok(message)
    }
}

fn string_arg(
    message_type: MessageType,
    position: usize,
    value: Option<Value>,
) -> Result<String, ProtocolError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ProtocolError::InvalidArgument {
            message_type,
            position,
            reason: "expected a string",
        }),
    }
}

/// A message emitted by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome {
        session_id: ClientId,
        protocol_version: u64,
        server_ident: String,
    },
    CallResult {
        call_id: Value,
        result: Value,
    },
    CallError {
        call_id: Value,
        error_uri: String,
        description: String,
        details: Option<Value>,
    },
    Event {
        topic: String,
        event: Value,
    },
}

impl ServerMessage {
    /// Message type of this message
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::Welcome { .. } => MessageType::Welcome,
            ServerMessage::CallResult { .. } => MessageType::CallResult,
            ServerMessage::CallError { .. } => MessageType::CallError,
            ServerMessage::Event { .. } => MessageType::Event,
        }
    }

    /// JSON array form
    pub fn to_value(&self) -> Value {
        let tag = self.message_type().type_id();
        match self {
            ServerMessage::Welcome {
                session_id,
                protocol_version,
                server_ident,
            } => json!([tag, session_id.as_str(), protocol_version, server_ident]),
            ServerMessage::CallResult { call_id, result } => json!([tag, call_id, result]),
            ServerMessage::CallError {
                call_id,
                error_uri,
                description,
                details,
            } => match details {
                Some(details) => json!([tag, call_id, error_uri, description, details]),
                None => json!([tag, call_id, error_uri, description]),
            },
            ServerMessage::Event { topic, event } => json!([tag, topic, event]),
        }
    }

    /// Serialized frame, ready for the transport
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_value().to_string())
    }
}
