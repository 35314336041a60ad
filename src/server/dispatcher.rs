//! Message dispatcher
//!
//! Routes a client's decoded envelopes to the PREFIX, CALL, SUBSCRIBE,
//! UNSUBSCRIBE and PUBLISH handlers, keeping the client's own topic set
//! and the shared topic registry in step.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::config::ServerConfig;
use super::handler::WampHandler;
use super::outbound::Outbound;
use crate::error::ProtocolError;
use crate::protocol::{ClientMessage, Envelope, Exclude, ServerMessage};
use crate::registry::TopicRegistry;
use crate::rpc::{CallInvocation, CallResponder};
use crate::session::{ClientContext, ClientId, ClientState};
use crate::stats::ServerCounters;

/// Routes client messages against a shared topic registry
pub struct Dispatcher<H: WampHandler> {
    registry: Arc<TopicRegistry>,
    handler: Arc<H>,
    outbound: Arc<dyn Outbound>,
    counters: Arc<ServerCounters>,
    call_timeout: Option<Duration>,
}

impl<H: WampHandler> Dispatcher<H> {
    /// Create a dispatcher
    pub fn new(
        config: &ServerConfig,
        registry: Arc<TopicRegistry>,
        handler: Arc<H>,
        outbound: Arc<dyn Outbound>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            registry,
            handler,
            outbound,
            counters,
            call_timeout: config.call_timeout,
        }
    }

    /// Get a reference to the topic registry
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    /// Get a reference to the application handler
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Route one envelope from `client`
    ///
    /// Malformed and server-only messages are rejected with a
    /// [`ProtocolError`] before any state changes; the caller decides
    /// whether to log and drop them.
    pub async fn dispatch(
        &self,
        client: &mut ClientState,
        envelope: Envelope,
    ) -> Result<(), ProtocolError> {
        let message = match ClientMessage::try_from(envelope) {
            Ok(message) => message,
            Err(e) => {
                client.stats.messages_dropped += 1;
                ServerCounters::incr(&self.counters.protocol_violations, 1);
                return Err(e);
            }
        };

        client.stats.record(message.message_type());
        ServerCounters::incr(&self.counters.messages_dispatched, 1);

        match message {
            ClientMessage::Prefix { prefix, uri } => self.handle_prefix(client, prefix, uri),
            ClientMessage::Call {
                call_id,
                proc_uri,
                args,
            } => self.handle_call(client, call_id, proc_uri, args).await,
            ClientMessage::Subscribe { topic, args } => {
                self.handle_subscribe(client, topic, args).await
            }
            ClientMessage::Unsubscribe { topic, args } => match topic {
                Some(topic) => self.handle_unsubscribe(client, topic, args).await,
                None => self.unsubscribe_all(client, args).await,
            },
            ClientMessage::Publish {
                topic,
                event,
                exclude,
                eligible,
                args,
            } => {
                self.handle_publish(client, topic, event, exclude, eligible, args)
                    .await
            }
        }

        Ok(())
    }

    /// Route a decoded JSON array
    pub async fn dispatch_value(
        &self,
        client: &mut ClientState,
        value: Value,
    ) -> Result<(), ProtocolError> {
        match Envelope::from_value(value) {
            Ok(envelope) => self.dispatch(client, envelope).await,
            Err(e) => {
                client.stats.messages_dropped += 1;
                ServerCounters::incr(&self.counters.protocol_violations, 1);
                Err(e)
            }
        }
    }

    /// Release everything `client` holds and close it
    ///
    /// Runs the unsubscribe-all path, then notifies the handler. Calling it
    /// on a closed client does nothing.
    pub async fn disconnect(&self, client: &mut ClientState) {
        if !client.is_active() {
            return;
        }

        self.unsubscribe_all(client, Vec::new()).await;
        client.close();

        let ctx = ClientContext::from(&*client);
        self.handler.on_disconnect(&ctx).await;
    }

    fn handle_prefix(&self, client: &mut ClientState, prefix: String, uri: String) {
        tracing::debug!(client = %client.id, prefix = %prefix, uri = %uri, "Prefix declared");
        client.prefixes.insert(prefix, uri);
    }

    async fn handle_call(
        &self,
        client: &mut ClientState,
        call_id: Value,
        proc_uri: String,
        args: Vec<Value>,
    ) {
        let proc_uri = client.resolve(&proc_uri);
        ServerCounters::incr(&self.counters.calls, 1);

        tracing::debug!(
            client = %client.id,
            call_id = %call_id,
            procedure = %proc_uri,
            args = args.len(),
            "Call"
        );

        let responder = CallResponder::new(client.id.clone(), call_id.clone(), Arc::clone(&self.outbound));
        if let Some(timeout) = self.call_timeout {
            responder.arm_timeout(timeout);
        }

        let invocation = CallInvocation {
            ctx: ClientContext::from(&*client),
            call_id,
            proc_uri,
            args,
            responder,
        };
        self.handler.on_call(invocation).await;
    }

    async fn handle_subscribe(&self, client: &mut ClientState, topic: String, args: Vec<Value>) {
        let topic = client.resolve(&topic);

        let held = client.add_topic(&topic);
        let registered = self.registry.subscribe(&topic, &client.id).await;
        if !(held || registered) {
            tracing::trace!(client = %client.id, topic = %topic, "Already subscribed");
            return;
        }

        client.stats.subscribes += 1;
        tracing::debug!(client = %client.id, topic = %topic, "Subscribed");

        let ctx = ClientContext::from(&*client);
        self.handler.on_subscribed(&ctx, &topic, &args).await;
    }

    async fn handle_unsubscribe(&self, client: &mut ClientState, topic: String, args: Vec<Value>) {
        let topic = client.resolve(&topic);

        let held = client.remove_topic(&topic);
        let registered = self.registry.unsubscribe(&topic, &client.id).await;
        if !(held || registered) {
            tracing::trace!(client = %client.id, topic = %topic, "Not subscribed");
            return;
        }

        tracing::debug!(client = %client.id, topic = %topic, "Unsubscribed");

        let ctx = ClientContext::from(&*client);
        self.handler.on_unsubscribed(&ctx, Some(&topic), &args).await;
    }

    async fn unsubscribe_all(&self, client: &mut ClientState, args: Vec<Value>) {
        let released = self.registry.unsubscribe_all(&client.id).await;
        let held = client.clear_topics();

        tracing::debug!(
            client = %client.id,
            topics = held.len().max(released.len()),
            "Unsubscribed from all topics"
        );

        let ctx = ClientContext::from(&*client);
        self.handler.on_unsubscribed(&ctx, None, &args).await;
    }

    async fn handle_publish(
        &self,
        client: &mut ClientState,
        topic: String,
        event: Value,
        exclude: Exclude,
        eligible: Option<Vec<ClientId>>,
        args: Vec<Value>,
    ) {
        let topic = client.resolve(&topic);
        let exclude = exclude.to_set(&client.id);

        // Serialize once; every recipient shares the frame
        let frame = ServerMessage::Event {
            topic: topic.clone(),
            event: event.clone(),
        }
        .to_bytes();

        let delivered = self
            .registry
            .publish(&topic, frame, &exclude, eligible.as_deref(), &*self.outbound)
            .await;
        ServerCounters::incr(&self.counters.events_delivered, delivered as u64);

        tracing::debug!(
            client = %client.id,
            topic = %topic,
            delivered = delivered,
            "Published"
        );

        let ctx = ClientContext::from(&*client);
        self.handler.on_publish(&ctx, &event, &topic, &args).await;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::server::outbound::ConnectionTable;

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Subscribed(String, String),
        Unsubscribed(String, Option<String>),
        Published(String, Value, String, Vec<Value>),
        Disconnected(String),
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<Recorded>>,
    }

    impl RecordingHandler {
        fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl WampHandler for RecordingHandler {
        async fn on_disconnect(&self, ctx: &ClientContext) {
            self.events
                .lock()
                .push(Recorded::Disconnected(ctx.client_id.to_string()));
        }

        async fn on_call(&self, call: CallInvocation) {
            match call.proc_uri.as_str() {
                "http://example.com/calc#add" => {
                    let sum: i64 = call.args.iter().filter_map(Value::as_i64).sum();
                    call.responder.result(sum).unwrap();
                }
                "http://example.com/calc#fail" => {
                    call.responder.error("division by zero").unwrap();
                }
                // Answered later, possibly never
                _ => {}
            }
        }

        async fn on_subscribed(&self, ctx: &ClientContext, topic: &str, _args: &[Value]) {
            self.events
                .lock()
                .push(Recorded::Subscribed(ctx.client_id.to_string(), topic.to_string()));
        }

        async fn on_unsubscribed(&self, ctx: &ClientContext, topic: Option<&str>, _args: &[Value]) {
            self.events.lock().push(Recorded::Unsubscribed(
                ctx.client_id.to_string(),
                topic.map(str::to_string),
            ));
        }

        async fn on_publish(&self, ctx: &ClientContext, event: &Value, topic: &str, args: &[Value]) {
            self.events.lock().push(Recorded::Published(
                ctx.client_id.to_string(),
                event.clone(),
                topic.to_string(),
                args.to_vec(),
            ));
        }
    }

    struct Harness {
        dispatcher: Dispatcher<RecordingHandler>,
        table: Arc<ConnectionTable>,
        handler: Arc<RecordingHandler>,
        registry: Arc<TopicRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            let config = ServerConfig::default().disable_call_timeout();
            let table = Arc::new(ConnectionTable::new());
            let handler = Arc::new(RecordingHandler::default());
            let registry = Arc::new(TopicRegistry::new());
            let dispatcher = Dispatcher::new(
                &config,
                Arc::clone(&registry),
                Arc::clone(&handler),
                table.clone(),
                Arc::new(ServerCounters::new()),
            );
            Self {
                dispatcher,
                table,
                handler,
                registry,
            }
        }

        fn client(&self, id: &str) -> (ClientState, mpsc::UnboundedReceiver<Bytes>) {
            let id = ClientId::new(id);
            let rx = self.table.register(&id).unwrap();
            (ClientState::new(id), rx)
        }

        async fn send(&self, client: &mut ClientState, value: Value) {
            self.dispatcher.dispatch_value(client, value).await.unwrap();
        }
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_slice(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_prefix_then_subscribe_resolves_curie() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([1, "ev", "http://example.com/event#"])).await;
        h.send(&mut a, json!([5, "ev:chat"])).await;

        assert!(a.is_subscribed("http://example.com/event#chat"));
        assert!(
            h.registry
                .is_subscribed("http://example.com/event#chat", &a.id)
                .await
        );
    }

    #[tokio::test]
    async fn test_subscribe_twice_raises_one_event() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut a, json!([5, "t"])).await;

        assert_eq!(h.registry.subscriber_count("t").await, 1);
        assert_eq!(a.topic_count(), 1);
        assert_eq!(
            h.handler.take(),
            vec![Recorded::Subscribed("a".into(), "t".into())]
        );
        assert_eq!(a.stats.subscribes, 1);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_sequences() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut a, json!([6, "t"])).await;
        assert!(!h.registry.is_subscribed("t", &a.id).await);

        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut a, json!([6, "t"])).await;
        assert!(!h.registry.is_subscribed("t", &a.id).await);
        assert!(!a.is_subscribed("t"));

        h.send(&mut a, json!([6, "t"])).await;
        h.send(&mut a, json!([5, "t"])).await;
        assert!(h.registry.is_subscribed("t", &a.id).await);
        assert!(a.is_subscribed("t"));
    }

    #[tokio::test]
    async fn test_single_topic_unsubscribe_raises_event() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([5, "t"])).await;
        h.handler.take();

        h.send(&mut a, json!([6, "t"])).await;
        h.send(&mut a, json!([6, "not-held"])).await;

        assert_eq!(
            h.handler.take(),
            vec![Recorded::Unsubscribed("a".into(), Some("t".into()))]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");
        let (mut b, _rx_b) = h.client("b");

        h.send(&mut a, json!([5, "t1"])).await;
        h.send(&mut a, json!([5, "t2"])).await;
        h.send(&mut b, json!([5, "t2"])).await;
        h.handler.take();

        h.send(&mut a, json!([6])).await;

        assert_eq!(a.topic_count(), 0);
        assert!(!h.registry.is_subscribed("t1", &a.id).await);
        assert!(!h.registry.is_subscribed("t2", &a.id).await);
        assert!(h.registry.is_subscribed("t2", &b.id).await);
        assert_eq!(
            h.handler.take(),
            vec![Recorded::Unsubscribed("a".into(), None)]
        );
    }

    #[tokio::test]
    async fn test_publish_excludes_publisher_by_default() {
        let h = Harness::new();
        let (mut a, mut rx_a) = h.client("a");
        let (mut b, mut rx_b) = h.client("b");
        let (mut c, mut rx_c) = h.client("c");
        for client in [&mut a, &mut b, &mut c] {
            h.send(client, json!([5, "t"])).await;
        }
        h.handler.take();

        h.send(&mut a, json!([7, "t", {"msg": "hi"}])).await;

        assert!(frames(&mut rx_a).is_empty());
        assert_eq!(frames(&mut rx_b), vec![json!([8, "t", {"msg": "hi"}])]);
        assert_eq!(frames(&mut rx_c), vec![json!([8, "t", {"msg": "hi"}])]);
        assert_eq!(
            h.handler.take(),
            vec![Recorded::Published(
                "a".into(),
                json!({"msg": "hi"}),
                "t".into(),
                vec![]
            )]
        );
    }

    #[tokio::test]
    async fn test_publish_exclude_forms() {
        let h = Harness::new();
        let (mut a, mut rx_a) = h.client("a");
        let (mut b, mut rx_b) = h.client("b");
        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut b, json!([5, "t"])).await;

        // Empty array: nobody excluded
        h.send(&mut a, json!([7, "t", 1, []])).await;
        assert_eq!(frames(&mut rx_a).len(), 1);
        assert_eq!(frames(&mut rx_b).len(), 1);

        // false: publisher included
        h.send(&mut a, json!([7, "t", 2, false])).await;
        assert_eq!(frames(&mut rx_a).len(), 1);
        assert_eq!(frames(&mut rx_b).len(), 1);

        // true: publisher excluded
        h.send(&mut a, json!([7, "t", 3, true])).await;
        assert!(frames(&mut rx_a).is_empty());
        assert_eq!(frames(&mut rx_b).len(), 1);

        // Explicit list may exclude someone other than the publisher
        h.send(&mut a, json!([7, "t", 4, ["b"]])).await;
        assert_eq!(frames(&mut rx_a), vec![json!([8, "t", 4])]);
        assert!(frames(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_publish_eligible_and_exclude() {
        let h = Harness::new();
        let (mut a, mut rx_a) = h.client("a");
        let (mut b, mut rx_b) = h.client("b");
        let (mut c, mut rx_c) = h.client("c");
        h.send(&mut a, json!([5, "t"])).await;
        h.send(&mut b, json!([5, "t"])).await;
        h.send(&mut c, json!([5, "t"])).await;
        h.send(&mut b, json!([6, "t"])).await;

        h.send(&mut a, json!([7, "t", "e", ["b"], ["a", "b", "c"]])).await;

        assert_eq!(frames(&mut rx_a).len(), 1);
        assert!(frames(&mut rx_b).is_empty());
        assert_eq!(frames(&mut rx_c).len(), 1);
    }

    #[tokio::test]
    async fn test_publish_remaining_args_reported() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([7, "t", "e", false, null, "x", 2])).await;

        assert_eq!(
            h.handler.take(),
            vec![Recorded::Published(
                "a".into(),
                json!("e"),
                "t".into(),
                vec![json!("x"), json!(2)]
            )]
        );
    }

    #[tokio::test]
    async fn test_call_result_only_to_caller() {
        let h = Harness::new();
        let (mut a, mut rx_a) = h.client("a");
        let (_b, mut rx_b) = h.client("b");

        h.send(&mut a, json!([1, "calc", "http://example.com/calc#"])).await;
        h.send(&mut a, json!([2, "c1", "calc:add", 40, 2])).await;

        assert_eq!(frames(&mut rx_a), vec![json!([3, "c1", 42])]);
        assert!(frames(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_call_error() {
        let h = Harness::new();
        let (mut a, mut rx_a) = h.client("a");

        h.send(&mut a, json!([2, "c9", "http://example.com/calc#fail"])).await;

        assert_eq!(
            frames(&mut rx_a),
            vec![json!([
                4,
                "c9",
                crate::protocol::constants::ERROR_URI_GENERIC,
                "division by zero"
            ])]
        );
    }

    #[tokio::test]
    async fn test_protocol_violation_leaves_state_untouched() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        let err = h
            .dispatcher
            .dispatch_value(&mut a, json!([99, "x"]))
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownMessageType(99));

        let err = h
            .dispatcher
            .dispatch_value(&mut a, json!([5]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Arity { .. }));

        let err = h
            .dispatcher
            .dispatch_value(&mut a, json!([3, "c1", 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessageType(_)));

        assert_eq!(a.stats.messages_dropped, 3);
        assert_eq!(a.stats.messages_received, 0);
        assert_eq!(h.registry.topic_count().await, 0);
        assert!(h.handler.take().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_releases_topics_once() {
        let h = Harness::new();
        let (mut a, _rx) = h.client("a");

        h.send(&mut a, json!([5, "t1"])).await;
        h.send(&mut a, json!([5, "t2"])).await;
        h.handler.take();

        h.dispatcher.disconnect(&mut a).await;
        h.dispatcher.disconnect(&mut a).await;

        assert!(!a.is_active());
        assert_eq!(h.registry.topic_count().await, 0);
        assert_eq!(
            h.handler.take(),
            vec![
                Recorded::Unsubscribed("a".into(), None),
                Recorded::Disconnected("a".into())
            ]
        );
    }
}
