//! Handler context
//!
//! Snapshot of client information passed to handler callbacks.

use std::time::Instant;

use super::client::{ClientId, ClientState};
use crate::stats::SessionStats;

/// Context passed to WampHandler callbacks
///
/// Read-only. Handlers influence the session only through return values
/// and the [`CallResponder`](crate::rpc::CallResponder).
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Session id of the originating client
    pub client_id: ClientId,

    /// When the client connected
    pub connected_at: Instant,

    /// Number of topics the client subscribes to
    pub subscriptions: usize,

    /// Session statistics at the time of the callback
    pub stats: SessionStats,
}

impl ClientContext {
    /// Create a context for a client that has not sent anything yet
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            connected_at: Instant::now(),
            subscriptions: 0,
            stats: SessionStats::default(),
        }
    }
}

impl From<&ClientState> for ClientContext {
    fn from(state: &ClientState) -> Self {
        Self {
            client_id: state.id.clone(),
            connected_at: state.connected_at,
            subscriptions: state.topic_count(),
            stats: state.stats.clone(),
        }
    }
}
