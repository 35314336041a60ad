//! Topic registry implementation
//!
//! The central registry that maps every topic URI to its subscribers and
//! fans published events out to them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::entry::{TopicEntry, TopicStats};
use crate::server::outbound::Outbound;
use crate::session::ClientId;

/// Central registry for all topics
///
/// Thread-safe via `RwLock`. Subscribe and unsubscribe take the write lock;
/// a publish holds the read lock for the whole fan-out, so a concurrent
/// subscription is either fully visible to it or ordered after it.
pub struct TopicRegistry {
    /// Map of topic URI to topic entry
    topics: RwLock<HashMap<String, TopicEntry>>,

    /// Configuration
    config: RegistryConfig,
}

impl TopicRegistry {
    /// Create a new topic registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new topic registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Add `client` to the subscribers of `topic`
    ///
    /// Creates the entry if needed. Returns false if the client was
    /// already subscribed.
    pub async fn subscribe(&self, topic: &str, client: &ClientId) -> bool {
        let mut topics = self.topics.write().await;

        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(TopicEntry::new);
        let added = entry.insert(client);

        if added {
            tracing::debug!(
                topic = %topic,
                client = %client,
                subscribers = entry.subscriber_count(),
                "Subscriber added"
            );
        }

        added
    }

    /// Remove `client` from the subscribers of `topic`
    ///
    /// Returns false if the client was not subscribed.
    pub async fn unsubscribe(&self, topic: &str, client: &ClientId) -> bool {
        let mut topics = self.topics.write().await;

        let Some(entry) = topics.get_mut(topic) else {
            return false;
        };
        let removed = entry.remove(client);
        let remaining = entry.subscriber_count();

        if remaining == 0 && !self.config.retain_empty_topics {
            topics.remove(topic);
        }

        if removed {
            tracing::debug!(
                topic = %topic,
                client = %client,
                subscribers = remaining,
                "Subscriber removed"
            );
        }

        removed
    }

    /// Remove `client` from every topic
    ///
    /// Walks all entries rather than trusting the client's own topic set,
    /// so no entry can keep a stale reference. Returns the topics the
    /// client was removed from.
    pub async fn unsubscribe_all(&self, client: &ClientId) -> Vec<String> {
        let mut topics = self.topics.write().await;
        self.remove_everywhere(&mut topics, client)
    }

    /// Blocking form of [`unsubscribe_all`](Self::unsubscribe_all)
    ///
    /// For callers outside any async runtime. Panics when called from
    /// within one.
    pub fn blocking_unsubscribe_all(&self, client: &ClientId) -> Vec<String> {
        let mut topics = self.topics.blocking_write();
        self.remove_everywhere(&mut topics, client)
    }

    fn remove_everywhere(
        &self,
        topics: &mut HashMap<String, TopicEntry>,
        client: &ClientId,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        for (topic, entry) in topics.iter_mut() {
            if entry.remove(client) {
                removed.push(topic.clone());
            }
        }

        if !self.config.retain_empty_topics {
            topics.retain(|_, entry| !entry.is_empty());
        }

        tracing::debug!(
            client = %client,
            topics = removed.len(),
            "Subscriber removed from all topics"
        );

        removed
    }

    /// Current subscribers of `topic`
    pub async fn subscribers(&self, topic: &str) -> Vec<ClientId> {
        let topics = self.topics.read().await;

        topics
            .get(topic)
            .map(|entry| entry.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `client` subscribes to `topic`
    pub async fn is_subscribed(&self, topic: &str, client: &ClientId) -> bool {
        let topics = self.topics.read().await;

        topics
            .get(topic)
            .map(|entry| entry.subscribers.contains(client))
            .unwrap_or(false)
    }

    /// Number of subscribers of `topic`
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map(TopicEntry::subscriber_count).unwrap_or(0)
    }

    /// Number of topics with at least one subscriber
    pub async fn topic_count(&self) -> usize {
        let topics = self.topics.read().await;
        topics.values().filter(|entry| !entry.is_empty()).count()
    }

    /// Get topic statistics
    ///
    /// Returns `None` for absent and empty topics alike.
    pub async fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        let topics = self.topics.read().await;

        topics
            .get(topic)
            .filter(|entry| !entry.is_empty())
            .map(TopicEntry::stats)
    }

    /// Compute who receives an event on `topic`
    ///
    /// Candidates are the current subscribers, narrowed to `eligible` when
    /// given, minus `exclude`. Identities in `eligible` that do not
    /// subscribe are never included.
    pub async fn recipients(
        &self,
        topic: &str,
        exclude: &HashSet<ClientId>,
        eligible: Option<&[ClientId]>,
    ) -> Vec<ClientId> {
        let topics = self.topics.read().await;

        match topics.get(topic) {
            Some(entry) => Self::select(entry, exclude, eligible).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Deliver a serialized EVENT frame to the recipients of `topic`
    ///
    /// Returns the number of clients the frame was queued for. A topic with
    /// no subscribers is a no-op.
    pub async fn publish<O: Outbound + ?Sized>(
        &self,
        topic: &str,
        frame: Bytes,
        exclude: &HashSet<ClientId>,
        eligible: Option<&[ClientId]>,
        outbound: &O,
    ) -> usize {
        let topics = self.topics.read().await;

        let Some(entry) = topics.get(topic) else {
            tracing::trace!(topic = %topic, "Publish to topic without subscribers");
            return 0;
        };
        entry.record_publish();

        let mut delivered = 0;
        for client in Self::select(entry, exclude, eligible) {
            // Bytes clone is a refcount bump
            if outbound.deliver(client, frame.clone()) {
                delivered += 1;
            }
        }

        delivered
    }

    fn select<'a>(
        entry: &'a TopicEntry,
        exclude: &'a HashSet<ClientId>,
        eligible: Option<&'a [ClientId]>,
    ) -> impl Iterator<Item = &'a ClientId> + 'a {
        let eligible: Option<HashSet<&ClientId>> = eligible.map(|ids| ids.iter().collect());

        entry.subscribers.iter().filter(move |client| {
            !exclude.contains(*client)
                && eligible
                    .as_ref()
                    .map_or(true, |allowed| allowed.contains(*client))
        })
    }

    /// Run cleanup task once
    ///
    /// Removes retained entries that have been empty longer than
    /// `empty_topic_ttl`.
    pub async fn cleanup(&self) {
        let mut topics = self.topics.write().await;
        let now = Instant::now();
        let ttl = self.config.empty_topic_ttl;

        let before = topics.len();
        topics.retain(|topic, entry| {
            let expired = entry.is_empty()
                && entry
                    .emptied_at
                    .map_or(now.duration_since(entry.created_at) > ttl, |at| {
                        now.duration_since(at) > ttl
                    });
            if expired {
                tracing::debug!(topic = %topic, "Topic removed by cleanup");
            }
            !expired
        });

        let removed = before - topics.len();
        if removed > 0 {
            tracing::info!(removed = removed, "Registry cleanup");
        }
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
