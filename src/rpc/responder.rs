//! One-shot CALL responder

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;

use super::error::CallError;
use crate::error::ReplyError;
use crate::protocol::ServerMessage;
use crate::server::outbound::Outbound;
use crate::session::{ClientContext, ClientId};

/// A CALL handed to the application
#[derive(Clone)]
pub struct CallInvocation {
    /// Calling client
    pub ctx: ClientContext,

    /// Call id chosen by the caller
    pub call_id: Value,

    /// Procedure URI, with CURIE prefixes already expanded
    pub proc_uri: String,

    /// Call arguments
    pub args: Vec<Value>,

    /// Sends the single reply
    pub responder: CallResponder,
}

impl std::fmt::Debug for CallInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallInvocation")
            .field("client", &self.ctx.client_id)
            .field("call_id", &self.call_id)
            .field("proc_uri", &self.proc_uri)
            .field("args", &self.args)
            .finish()
    }
}

/// Replies to one CALL, exactly once
///
/// Cheap to clone and safe to move across tasks. The first call to
/// [`respond`](Self::respond) sends CALL_RESULT or CALL_ERROR to the
/// calling client; every later call returns [`ReplyError::DoubleReply`]
/// and sends nothing.
#[derive(Clone)]
pub struct CallResponder {
    inner: Arc<Inner>,
}

struct Inner {
    client: ClientId,
    call_id: Value,
    replied: AtomicBool,
    answered: Notify,
    outbound: Arc<dyn Outbound>,
}

impl CallResponder {
    pub(crate) fn new(client: ClientId, call_id: Value, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                call_id,
                replied: AtomicBool::new(false),
                answered: Notify::new(),
                outbound,
            }),
        }
    }

    /// Call id this responder answers
    pub fn call_id(&self) -> &Value {
        &self.inner.call_id
    }

    /// Client that made the call
    pub fn client_id(&self) -> &ClientId {
        &self.inner.client
    }

    /// Whether a reply has already been sent
    pub fn is_answered(&self) -> bool {
        self.inner.replied.load(Ordering::Acquire)
    }

    /// Send the outcome of the call
    pub fn respond(&self, outcome: Result<Value, CallError>) -> Result<(), ReplyError> {
        let inner = &self.inner;

        if inner.replied.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                client = %inner.client,
                call_id = %inner.call_id,
                "Ignoring second reply to call"
            );
            return Err(ReplyError::DoubleReply {
                call_id: inner.call_id.clone(),
            });
        }
        inner.answered.notify_waiters();

        let message = match outcome {
            Ok(result) => ServerMessage::CallResult {
                call_id: inner.call_id.clone(),
                result,
            },
            Err(err) => {
                tracing::debug!(
                    client = %inner.client,
                    call_id = %inner.call_id,
                    error_uri = %err.uri,
                    "Call failed"
                );
                ServerMessage::CallError {
                    call_id: inner.call_id.clone(),
                    error_uri: err.uri,
                    description: err.description,
                    details: err.details,
                }
            }
        };

        if inner.outbound.deliver(&inner.client, message.to_bytes()) {
            Ok(())
        } else {
            Err(ReplyError::ClientGone(inner.client.clone()))
        }
    }

    /// Reply with a result
    pub fn result(&self, result: impl Into<Value>) -> Result<(), ReplyError> {
        self.respond(Ok(result.into()))
    }

    /// Reply with an error
    pub fn error(&self, err: impl Into<CallError>) -> Result<(), ReplyError> {
        self.respond(Err(err.into()))
    }

    /// Answer with a timeout error unless a reply arrives within `timeout`
    pub(crate) fn arm_timeout(&self, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let responder = self.clone();

        tokio::spawn(async move {
            let answered = responder.inner.answered.notified();
            tokio::pin!(answered);
            // Register before checking the flag so a reply racing with
            // this task is not missed.
            answered.as_mut().enable();
            if responder.is_answered() {
                return;
            }

            tokio::select! {
                _ = answered => {}
                _ = tokio::time::sleep(timeout) => {
                    if responder.error(CallError::timeout()).is_ok() {
                        tracing::warn!(
                            client = %responder.inner.client,
                            call_id = %responder.inner.call_id,
                            timeout_ms = timeout.as_millis() as u64,
                            "Call timed out"
                        );
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for CallResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResponder")
            .field("client", &self.inner.client)
            .field("call_id", &self.inner.call_id)
            .field("answered", &self.is_answered())
            .finish()
    }
}
