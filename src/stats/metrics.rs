//! Statistics and metrics for WAMP sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::protocol::MessageType;

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Messages received and routed
    pub messages_received: u64,
    /// Messages dropped as protocol violations
    pub messages_dropped: u64,
    /// CALL messages
    pub calls: u64,
    /// PUBLISH messages
    pub publishes: u64,
    /// SUBSCRIBE messages that created a new subscription
    pub subscribes: u64,
    /// UNSUBSCRIBE messages
    pub unsubscribes: u64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successfully decoded message
    pub fn record(&mut self, message_type: MessageType) {
        self.messages_received += 1;
        match message_type {
            MessageType::Call => self.calls += 1,
            MessageType::Publish => self.publishes += 1,
            MessageType::Unsubscribe => self.unsubscribes += 1,
            _ => {}
        }
    }
}

/// Server-wide counters, shared by the server and its dispatcher
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    pub(crate) total_connections: AtomicU64,
    pub(crate) active_connections: AtomicU64,
    pub(crate) messages_dispatched: AtomicU64,
    pub(crate) protocol_violations: AtomicU64,
    pub(crate) events_delivered: AtomicU64,
    pub(crate) calls: AtomicU64,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot; `topics` comes from the registry
    pub fn snapshot(&self, topics: usize) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            topics: topics as u64,
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Topics with at least one subscriber
    pub topics: u64,
    /// Messages routed to a handler
    pub messages_dispatched: u64,
    /// Messages dropped as protocol violations
    pub protocol_violations: u64,
    /// EVENT messages queued for delivery
    pub events_delivered: u64,
    /// CALL messages handed to the application
    pub calls: u64,
    /// Uptime
    pub uptime: Duration,
}
