//! Topic registry configuration

use std::time::Duration;

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Keep topic entries after their last subscriber leaves
    ///
    /// Empty entries never receive events and are not reported by
    /// `topic_count`; retaining them only saves reallocation for topics
    /// that churn. Retained entries are removed by `cleanup` after
    /// `empty_topic_ttl`.
    pub retain_empty_topics: bool,

    /// How long a retained empty entry survives
    pub empty_topic_ttl: Duration,

    /// Interval of the background cleanup task
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retain_empty_topics: false,
            empty_topic_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl RegistryConfig {
    /// Keep empty topic entries until cleanup
    pub fn retain_empty_topics(mut self, retain: bool) -> Self {
        self.retain_empty_topics = retain;
        self
    }

    /// Set the lifetime of retained empty entries
    pub fn empty_topic_ttl(mut self, ttl: Duration) -> Self {
        self.empty_topic_ttl = ttl;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
