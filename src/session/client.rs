//! Per-connection client state
//!
//! Tracks everything the router knows about one connected client: its
//! session id, declared prefixes and the topics it subscribes to. The topic
//! set here mirrors the client's entries in the
//! [`TopicRegistry`](crate::registry::TopicRegistry); the dispatcher updates
//! both together.

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use super::prefixes::PrefixTable;
use crate::stats::SessionStats;

/// Opaque session identity, unique per connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected and accepting messages
    Active,
    /// Disconnected; subscriptions have been released
    Closed,
}

/// Complete client state
#[derive(Debug)]
pub struct ClientState {
    /// Session id
    pub id: ClientId,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Declared CURIE prefixes
    pub prefixes: PrefixTable,

    /// Fully-qualified topic URIs this client subscribes to
    topics: HashSet<String>,

    /// Per-session counters
    pub stats: SessionStats,
}

impl ClientState {
    /// Create state for a freshly connected client
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            phase: SessionPhase::Active,
            connected_at: Instant::now(),
            prefixes: PrefixTable::new(),
            topics: HashSet::new(),
            stats: SessionStats::default(),
        }
    }

    /// Expand a CURIE using this client's prefixes
    pub fn resolve(&self, token: &str) -> String {
        self.prefixes.resolve_or_pass(token)
    }

    /// Record a subscription; returns false if it was already held
    pub(crate) fn add_topic(&mut self, topic: &str) -> bool {
        self.topics.insert(topic.to_string())
    }

    /// Drop a subscription; returns false if it was not held
    pub(crate) fn remove_topic(&mut self, topic: &str) -> bool {
        self.topics.remove(topic)
    }

    /// Drop every subscription, returning the topics that were held
    pub(crate) fn clear_topics(&mut self) -> Vec<String> {
        self.topics.drain().collect()
    }

    /// Whether the client subscribes to `topic`
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Topics this client subscribes to
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Number of subscribed topics
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Mark the session closed
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_lifecycle() {
        let mut state = ClientState::new(ClientId::new("s1"));

        assert!(state.is_active());
        assert_eq!(state.topic_count(), 0);
        assert!(state.prefixes.is_empty());

        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
        assert!(!state.is_active());
    }

    #[test]
    fn test_topic_set() {
        let mut state = ClientState::new(ClientId::new("s1"));

        assert!(state.add_topic("t1"));
        assert!(!state.add_topic("t1"));
        assert!(state.add_topic("t2"));
        assert!(state.is_subscribed("t1"));

        assert!(state.remove_topic("t1"));
        assert!(!state.remove_topic("t1"));

        let mut cleared = state.clear_topics();
        cleared.sort();
        assert_eq!(cleared, vec!["t2".to_string()]);
        assert_eq!(state.topic_count(), 0);
    }

    #[test]
    fn test_resolve_uses_own_prefixes() {
        let mut state = ClientState::new(ClientId::new("s1"));
        state.prefixes.insert("ev", "http://example.com/event#");

        assert_eq!(state.resolve("ev:chat"), "http://example.com/event#chat");
        assert_eq!(state.resolve("other:chat"), "other:chat");
    }

    #[test]
    fn test_client_id_display() {
        let id: ClientId = "abc".into();
        assert_eq!(id.to_string(), "abc");
        assert_eq!(id.as_str(), "abc");
    }
}
