//! Application handler trait
//!
//! Implement [`WampHandler`] to receive the application-facing events the
//! router raises. Every method has a default, so implementors override only
//! what they need.
//!
//! Handlers are awaited inline by the dispatcher, which processes one
//! client's messages in order. Long-running work in `on_call` should be
//! spawned onto its own task; the [`CallResponder`](crate::rpc::CallResponder)
//! can be moved there and answered later.

use std::future::Future;

use serde_json::Value;

use crate::rpc::{CallError, CallInvocation};
use crate::session::ClientContext;

/// Application event sink
pub trait WampHandler: Send + Sync + 'static {
    /// A client connected; return false to refuse the session
    fn on_connection(&self, ctx: &ClientContext) -> impl Future<Output = bool> + Send {
        let _ = ctx;
        async { true }
    }

    /// A client disconnected, after its subscriptions were released
    fn on_disconnect(&self, ctx: &ClientContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }

    /// A client called a procedure
    ///
    /// The default answers every call with a "no such procedure" error.
    fn on_call(&self, call: CallInvocation) -> impl Future<Output = ()> + Send {
        async move {
            let _ = call
                .responder
                .error(CallError::no_such_procedure(&call.proc_uri));
        }
    }

    /// A client subscribed to a topic it did not already hold
    fn on_subscribed(
        &self,
        ctx: &ClientContext,
        topic: &str,
        args: &[Value],
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, topic, args);
        async {}
    }

    /// A client unsubscribed
    ///
    /// `topic` is `None` when the client left every topic, either by an
    /// UNSUBSCRIBE without a topic or by disconnecting.
    fn on_unsubscribed(
        &self,
        ctx: &ClientContext,
        topic: Option<&str>,
        args: &[Value],
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, topic, args);
        async {}
    }

    /// A client published an event; raised after the fan-out
    fn on_publish(
        &self,
        ctx: &ClientContext,
        event: &Value,
        topic: &str,
        args: &[Value],
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, event, topic, args);
        async {}
    }
}
