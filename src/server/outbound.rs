//! Outbound delivery
//!
//! The router never writes to sockets. It hands serialized frames to an
//! [`Outbound`] implementation, keyed by session id; the transport drains
//! each client's queue and writes the frames out.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::session::ClientId;

/// Best-effort, non-blocking delivery of frames to a client
pub trait Outbound: Send + Sync {
    /// Queue `frame` for `client`
    ///
    /// Returns false if the client is unknown or its queue is closed.
    fn deliver(&self, client: &ClientId, frame: Bytes) -> bool;
}

/// Per-client outbound queues
///
/// Each connected client owns the receiving half of an unbounded channel;
/// delivery never blocks the router.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    queues: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Bytes>>>,
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return the receiver for its frames
    pub fn register(&self, client: &ClientId) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let mut queues = self.queues.write();
        if queues.contains_key(client) {
            return Err(Error::DuplicateClient(client.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(client.clone(), tx);
        Ok(rx)
    }

    /// Remove a client's queue; its receiver sees end-of-stream
    pub fn remove(&self, client: &ClientId) -> bool {
        self.queues.write().remove(client).is_some()
    }

    /// Whether a client is registered
    pub fn contains(&self, client: &ClientId) -> bool {
        self.queues.read().contains_key(client)
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.queues.read().len()
    }

    /// Whether no clients are registered
    pub fn is_empty(&self) -> bool {
        self.queues.read().is_empty()
    }
}

impl Outbound for ConnectionTable {
    fn deliver(&self, client: &ClientId, frame: Bytes) -> bool {
        match self.queues.read().get(client) {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                tracing::trace!(client = %client, "Dropping frame for unknown client");
                false
            }
        }
    }
}
