//! Topic entry types
//!
//! This module defines the per-topic state stored in the registry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::session::ClientId;

/// Entry for a single topic in the registry
///
/// Holds subscriber identities only; connection lifetimes are owned by
/// the server.
#[derive(Debug)]
pub struct TopicEntry {
    /// Subscribed session ids
    pub(super) subscribers: HashSet<ClientId>,

    /// Events published on this topic
    pub(super) events_published: AtomicU64,

    /// When the entry was created
    pub created_at: Instant,

    /// When the last subscriber left (retained entries only)
    pub emptied_at: Option<Instant>,
}

impl TopicEntry {
    /// Create a new, empty entry
    pub(super) fn new() -> Self {
        Self {
            subscribers: HashSet::new(),
            events_published: AtomicU64::new(0),
            created_at: Instant::now(),
            emptied_at: None,
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody subscribes
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(super) fn insert(&mut self, client: &ClientId) -> bool {
        self.emptied_at = None;
        self.subscribers.insert(client.clone())
    }

    pub(super) fn remove(&mut self, client: &ClientId) -> bool {
        let removed = self.subscribers.remove(client);
        if removed && self.subscribers.is_empty() {
            self.emptied_at = Some(Instant::now());
        }
        removed
    }

    pub(super) fn record_publish(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn stats(&self) -> TopicStats {
        TopicStats {
            subscriber_count: self.subscriber_count(),
            events_published: self.events_published.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

/// Statistics for a topic
#[derive(Debug, Clone)]
pub struct TopicStats {
    /// Number of subscribers
    pub subscriber_count: usize,
    /// Events published since the entry was created
    pub events_published: u64,
    /// Time since the entry was created
    pub age: Duration,
}
