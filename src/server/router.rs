//! WAMP router
//!
//! Owns the shared topic registry and the per-client outbound queues, and
//! hands out a [`ClientHandle`] for every connection the transport accepts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use super::config::ServerConfig;
use super::dispatcher::Dispatcher;
use super::handler::WampHandler;
use super::outbound::{ConnectionTable, Outbound};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::PROTOCOL_VERSION;
use crate::protocol::{Envelope, ServerMessage};
use crate::registry::{RegistryConfig, TopicRegistry};
use crate::session::{ClientContext, ClientId, ClientState};
use crate::stats::{ServerCounters, ServerStats};

/// WAMP server
pub struct WampServer<H: WampHandler> {
    config: ServerConfig,
    shared: Arc<Shared<H>>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

struct Shared<H: WampHandler> {
    dispatcher: Dispatcher<H>,
    connections: Arc<ConnectionTable>,
    counters: Arc<ServerCounters>,
}

impl<H: WampHandler> Shared<H> {
    async fn release(&self, state: &mut ClientState) {
        if !state.is_active() {
            return;
        }

        self.dispatcher.disconnect(state).await;
        self.connections.remove(&state.id);
        self.counters.connection_closed();

        tracing::info!(
            client = %state.id,
            duration_ms = state.duration().as_millis() as u64,
            messages = state.stats.messages_received,
            "Client disconnected"
        );
    }

    /// Release without a runtime; the handler is not told
    fn release_blocking(&self, state: &mut ClientState) {
        if !state.is_active() {
            return;
        }

        self.dispatcher.registry().blocking_unsubscribe_all(&state.id);
        state.clear_topics();
        state.close();
        self.connections.remove(&state.id);
        self.counters.connection_closed();

        tracing::warn!(
            client = %state.id,
            "Client dropped outside runtime; released without on_disconnect"
        );
    }
}

impl<H: WampHandler> WampServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_registry_config(config, handler, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        handler: H,
        registry_config: RegistryConfig,
    ) -> Self {
        Self::with_registry(
            config,
            handler,
            Arc::new(TopicRegistry::with_config(registry_config)),
        )
    }

    /// Create a new server around an existing topic registry
    pub fn with_registry(config: ServerConfig, handler: H, registry: Arc<TopicRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let connections = Arc::new(ConnectionTable::new());
        let counters = Arc::new(ServerCounters::new());
        let dispatcher = Dispatcher::new(
            &config,
            registry,
            Arc::new(handler),
            connections.clone(),
            Arc::clone(&counters),
        );

        Self {
            config,
            shared: Arc::new(Shared {
                dispatcher,
                connections,
                counters,
            }),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the topic registry
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        self.shared.dispatcher.registry()
    }

    /// Get a reference to the application handler
    pub fn handler(&self) -> &Arc<H> {
        self.shared.dispatcher.handler()
    }

    /// Queue a frame for any connected client
    pub fn send_to(&self, client: &ClientId, message: &ServerMessage) -> bool {
        self.shared.connections.deliver(client, message.to_bytes())
    }

    /// Accept a new client with a server-assigned session id
    ///
    /// Returns the client's handle and the receiver of its serialized
    /// outbound frames. WELCOME is already queued when this returns.
    /// Ids already taken through [`connect_with_id`](Self::connect_with_id)
    /// are skipped.
    pub async fn connect(&self) -> Result<(ClientHandle<H>, mpsc::UnboundedReceiver<Bytes>)> {
        loop {
            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            match self
                .connect_with_id(ClientId::new(session_id.to_string()))
                .await
            {
                Err(Error::DuplicateClient(id)) => {
                    tracing::debug!(client = %id, "Session id in use, skipping");
                }
                result => return result,
            }
        }
    }

    /// Accept a new client with an externally assigned session id
    pub async fn connect_with_id(
        &self,
        id: ClientId,
    ) -> Result<(ClientHandle<H>, mpsc::UnboundedReceiver<Bytes>)> {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(client = %id, "Connection rejected: limit reached");
                    return Err(Error::ConnectionLimit);
                }
            }
        } else {
            None
        };

        let rx = self.shared.connections.register(&id)?;

        let ctx = ClientContext::new(id.clone());
        if !self.handler().on_connection(&ctx).await {
            self.shared.connections.remove(&id);
            tracing::info!(client = %id, "Connection rejected by handler");
            return Err(Error::ConnectionRejected(id));
        }

        self.shared.counters.connection_opened();
        tracing::info!(client = %id, "Client connected");

        if self.config.send_welcome {
            let welcome = ServerMessage::Welcome {
                session_id: id.clone(),
                protocol_version: PROTOCOL_VERSION,
                server_ident: self.config.server_ident.clone(),
            };
            self.shared.connections.deliver(&id, welcome.to_bytes());
        }

        let handle = ClientHandle {
            state: ClientState::new(id),
            shared: Arc::clone(&self.shared),
            permit,
        };

        Ok((handle, rx))
    }

    /// Server-wide statistics
    pub async fn stats(&self) -> ServerStats {
        let topics = self.registry().topic_count().await;
        self.shared.counters.snapshot(topics)
    }

    /// Spawn the registry cleanup task
    ///
    /// Only needed when the registry retains empty topics.
    pub fn spawn_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        self.registry().spawn_cleanup_task()
    }
}

/// One connected client
///
/// The transport feeds decoded messages into [`dispatch`](Self::dispatch)
/// in receipt order. Dropping the handle disconnects the client; prefer
/// calling [`disconnect`](Self::disconnect) so cleanup finishes before
/// the caller continues.
///
/// A handle dropped outside a tokio runtime is released synchronously,
/// but [`WampHandler::on_disconnect`] is not raised for it.
pub struct ClientHandle<H: WampHandler> {
    state: ClientState,
    shared: Arc<Shared<H>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<H: WampHandler> ClientHandle<H> {
    /// Session id of this client
    pub fn id(&self) -> &ClientId {
        &self.state.id
    }

    /// Current client state
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Route one decoded envelope
    ///
    /// Protocol violations are logged and dropped; the connection stays up.
    /// The violation is returned for callers that want to act on it.
    pub async fn dispatch(&mut self, envelope: Envelope) -> std::result::Result<(), ProtocolError> {
        if !self.state.is_active() {
            tracing::debug!(client = %self.state.id, "Message after disconnect ignored");
            return Ok(());
        }

        let result = self.shared.dispatcher.dispatch(&mut self.state, envelope).await;
        self.log_violation(&result);
        result
    }

    /// Route a decoded JSON array
    pub async fn dispatch_value(&mut self, value: Value) -> std::result::Result<(), ProtocolError> {
        if !self.state.is_active() {
            return Ok(());
        }

        let result = self
            .shared
            .dispatcher
            .dispatch_value(&mut self.state, value)
            .await;
        self.log_violation(&result);
        result
    }

    /// Parse and route a JSON text frame
    pub async fn dispatch_json(&mut self, text: &str) -> Result<()> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.state.stats.messages_dropped += 1;
                ServerCounters::incr(&self.shared.counters.protocol_violations, 1);
                tracing::warn!(client = %self.state.id, error = %e, "Dropping unparsable frame");
                return Err(e.into());
            }
        };
        Ok(self.dispatch_value(value).await?)
    }

    /// Release all subscriptions and close the outbound queue
    pub async fn disconnect(mut self) {
        self.shared.release(&mut self.state).await;
    }

    fn log_violation(&self, result: &std::result::Result<(), ProtocolError>) {
        if let Err(e) = result {
            tracing::warn!(client = %self.state.id, error = %e, "Dropping message");
        }
    }
}

impl<H: WampHandler> Drop for ClientHandle<H> {
    fn drop(&mut self) {
        if !self.state.is_active() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.shared.release_blocking(&mut self.state);
            return;
        };

        let id = self.state.id.clone();
        let mut state = std::mem::replace(&mut self.state, ClientState::new(id));
        self.state.close();
        let shared = Arc::clone(&self.shared);
        let permit = self.permit.take();

        runtime.spawn(async move {
            shared.release(&mut state).await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::protocol::constants::{ERROR_URI_NO_SUCH_PROCEDURE, ERROR_URI_TIMEOUT};
    use crate::rpc::CallInvocation;

    struct CalcHandler;

    impl WampHandler for CalcHandler {
        async fn on_connection(&self, ctx: &ClientContext) -> bool {
            ctx.client_id.as_str() != "banned"
        }

        async fn on_call(&self, call: CallInvocation) {
            match call.proc_uri.as_str() {
                "http://example.com/calc#add" => {
                    let sum: i64 = call.args.iter().filter_map(Value::as_i64).sum();
                    let _ = call.responder.result(sum);
                }
                "http://example.com/calc#slow" => {
                    // Reply from another task, twice
                    tokio::spawn(async move {
                        let _ = call.responder.result("first");
                        let _ = call.responder.result("second");
                    });
                }
                "http://example.com/calc#never" => {}
                _ => {
                    let _ = call
                        .responder
                        .error(crate::rpc::CallError::no_such_procedure(&call.proc_uri));
                }
            }
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Value {
        serde_json::from_slice(&rx.recv().await.unwrap()).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_slice(&frame).unwrap());
        }
        out
    }

    fn server() -> WampServer<CalcHandler> {
        WampServer::new(ServerConfig::default().server_ident("test"), CalcHandler)
    }

    #[tokio::test]
    async fn test_connect_sends_welcome() {
        let server = server();
        let (client, mut rx) = server.connect().await.unwrap();

        assert_eq!(
            next(&mut rx).await,
            json!([0, client.id().as_str(), 1, "test"])
        );
    }

    #[tokio::test]
    async fn test_connect_assigns_unique_ids() {
        let server = server();
        let (a, _rx_a) = server.connect().await.unwrap();
        let (b, _rx_b) = server.connect().await.unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(server.stats().await.active_connections, 2);
    }

    #[tokio::test]
    async fn test_duplicate_and_rejected_ids() {
        let server = server();
        let (_a, _rx) = server.connect_with_id(ClientId::new("x")).await.unwrap();

        assert!(matches!(
            server.connect_with_id(ClientId::new("x")).await,
            Err(Error::DuplicateClient(_))
        ));
        assert!(matches!(
            server.connect_with_id(ClientId::new("banned")).await,
            Err(Error::ConnectionRejected(_))
        ));
        assert_eq!(server.stats().await.active_connections, 1);
    }

    #[tokio::test]
    async fn test_connect_skips_ids_taken_by_connect_with_id() {
        let server = server();
        let (_taken, _rx) = server.connect_with_id(ClientId::new("1")).await.unwrap();

        let (generated, _rx) = server.connect().await.unwrap();

        assert_eq!(generated.id().as_str(), "2");
        assert_eq!(server.stats().await.active_connections, 2);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = WampServer::new(ServerConfig::default().max_connections(1), CalcHandler);
        let (a, _rx) = server.connect().await.unwrap();

        assert!(matches!(server.connect().await, Err(Error::ConnectionLimit)));

        a.disconnect().await;
        assert!(server.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_pubsub_end_to_end() {
        let server = WampServer::new(ServerConfig::default().disable_welcome(), CalcHandler);
        let (mut a, mut rx_a) = server.connect_with_id(ClientId::new("A")).await.unwrap();
        let (mut b, mut rx_b) = server.connect_with_id(ClientId::new("B")).await.unwrap();
        let (mut c, mut rx_c) = server.connect_with_id(ClientId::new("C")).await.unwrap();

        for client in [&mut a, &mut b, &mut c] {
            client
                .dispatch_json(r#"[5, "http://example.com/topic"]"#)
                .await
                .unwrap();
        }

        a.dispatch_json(r#"[7, "http://example.com/topic", "E"]"#)
            .await
            .unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![json!([8, "http://example.com/topic", "E"])]);
        assert_eq!(drain(&mut rx_c), vec![json!([8, "http://example.com/topic", "E"])]);

        let stats = server.stats().await;
        assert_eq!(stats.topics, 1);
        assert_eq!(stats.events_delivered, 2);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_registry() {
        let server = server();
        let (mut a, _rx_a) = server.connect().await.unwrap();
        let id = a.id().clone();

        a.dispatch_value(json!([5, "t1"])).await.unwrap();
        a.dispatch_value(json!([5, "t2"])).await.unwrap();
        a.disconnect().await;

        assert!(!server.registry().is_subscribed("t1", &id).await);
        assert!(!server.registry().is_subscribed("t2", &id).await);
        assert_eq!(server.stats().await.active_connections, 0);
        assert!(!server.send_to(&id, &ServerMessage::Event { topic: "t1".into(), event: Value::Null }));
    }

    #[tokio::test]
    async fn test_drop_disconnects() {
        let server = server();
        let (mut a, mut rx) = server.connect().await.unwrap();
        let id = a.id().clone();
        a.dispatch_value(json!([5, "t"])).await.unwrap();

        drop(a);

        // Queue closes once the spawned cleanup ran
        while rx.recv().await.is_some() {}
        assert!(!server.registry().is_subscribed("t", &id).await);
    }

    #[test]
    fn test_drop_outside_runtime_releases_client() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = server();

        let (a, mut rx, id) = rt.block_on(async {
            let (mut a, rx) = server.connect().await.unwrap();
            a.dispatch_value(json!([5, "t"])).await.unwrap();
            let id = a.id().clone();
            (a, rx, id)
        });

        drop(a);

        rt.block_on(async {
            assert!(!server.registry().is_subscribed("t", &id).await);
            assert_eq!(server.registry().topic_count().await, 0);
            assert_eq!(server.stats().await.active_connections, 0);

            // WELCOME, then end-of-stream
            assert!(rx.recv().await.is_some());
            assert!(rx.recv().await.is_none());
        });
    }

    #[tokio::test]
    async fn test_numeric_call_id_echoed() {
        let server = WampServer::new(ServerConfig::default().disable_welcome(), CalcHandler);
        let (mut a, mut rx) = server.connect().await.unwrap();

        a.dispatch_value(json!([2, 17, "http://example.com/calc#add", 1, 2]))
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await, json!([3, 17, 3]));

        a.dispatch_value(json!([2, 18, "http://example.com/nope"]))
            .await
            .unwrap();
        let reply = next(&mut rx).await;
        assert_eq!(reply[0], json!(4));
        assert_eq!(reply[1], json!(18));
    }

    #[tokio::test]
    async fn test_violations_do_not_close_connection() {
        let server = WampServer::new(ServerConfig::default().disable_welcome(), CalcHandler);
        let (mut a, mut rx) = server.connect().await.unwrap();

        assert!(matches!(a.dispatch_json("not json").await, Err(Error::Json(_))));
        assert!(matches!(
            a.dispatch_json("[42]").await,
            Err(Error::Protocol(ProtocolError::UnknownMessageType(42)))
        ));
        assert!(a.dispatch_value(json!("x")).await.is_err());

        a.dispatch_json(r#"[2, "c1", "http://example.com/calc#add", 1, 2]"#)
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await, json!([3, "c1", 3]));

        assert_eq!(a.state().stats.messages_dropped, 3);
        assert_eq!(server.stats().await.protocol_violations, 3);
    }

    #[tokio::test]
    async fn test_async_double_reply_sends_once() {
        let server = WampServer::new(ServerConfig::default().disable_welcome(), CalcHandler);
        let (mut a, mut rx) = server.connect().await.unwrap();

        a.dispatch_json(r#"[2, "c1", "http://example.com/calc#slow"]"#)
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, json!([3, "c1", "first"]));
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let server = WampServer::new(ServerConfig::default().disable_welcome(), CalcHandler);
        let (mut a, mut rx) = server.connect().await.unwrap();

        a.dispatch_json(r#"[2, "c1", "http://example.com/nope"]"#)
            .await
            .unwrap();

        let reply = next(&mut rx).await;
        assert_eq!(reply[0], json!(4));
        assert_eq!(reply[2], json!(ERROR_URI_NO_SUCH_PROCEDURE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out() {
        let config = ServerConfig::default()
            .disable_welcome()
            .call_timeout(Duration::from_secs(2));
        let server = WampServer::new(config, CalcHandler);
        let (mut a, mut rx) = server.connect().await.unwrap();

        a.dispatch_json(r#"[2, "c1", "http://example.com/calc#never"]"#)
            .await
            .unwrap();

        let reply = next(&mut rx).await;
        assert_eq!(reply, json!([4, "c1", ERROR_URI_TIMEOUT, "call timed out"]));
    }
}
