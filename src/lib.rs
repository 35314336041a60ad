//! # wamp-rs
//!
//! Server-side routing core for the WAMP v1 pub/sub and RPC protocol.
//!
//! The crate interprets decoded envelopes (`[typeId, ...args]`) sent by
//! connected clients, expands CURIE prefixes, maintains the topic registry,
//! fans published events out to subscribers and bridges CALL messages to an
//! application supplied [`WampHandler`].
//!
//! Transport (WebSocket accept, framing) is left to the embedding
//! application: feed decoded envelopes into a [`ClientHandle`] and write the
//! serialized frames it produces back to the socket.
//!
//! ```no_run
//! use wamp_rs::{ServerConfig, WampServer};
//! use wamp_rs::server::handler::WampHandler;
//!
//! struct App;
//! impl WampHandler for App {}
//!
//! # async fn example(mut incoming: tokio::sync::mpsc::Receiver<String>) -> wamp_rs::Result<()> {
//! let server = WampServer::new(ServerConfig::default(), App);
//! let (mut client, mut frames) = server.connect().await?;
//!
//! tokio::spawn(async move {
//!     while let Some(frame) = frames.recv().await {
//!         // write `frame` to the websocket
//! #       let _ = frame;
//!     }
//! });
//!
//! while let Some(text) = incoming.recv().await {
//!     // Violations are already logged; keep the connection open
//!     if let Err(e) = client.dispatch_json(&text).await {
//!         tracing::debug!(error = %e, "Frame ignored");
//!     }
//! }
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, ProtocolError, ReplyError, Result};
pub use protocol::{ClientMessage, Envelope, MessageType, ServerMessage};
pub use registry::{RegistryConfig, TopicRegistry};
pub use rpc::{CallError, CallInvocation, CallResponder};
pub use server::{ClientHandle, Dispatcher, ServerConfig, WampServer};
pub use session::{ClientId, ClientState, PrefixTable};
