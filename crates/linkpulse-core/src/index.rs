//! Subscription index.
//!
//! Maps each topic (short code) to the connections interested in it, plus the
//! reverse mapping so a disconnect only touches that connection's topics.
//! Owned by the hub's control loop; never shared.

use linkpulse_transport::ConnectionId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Topic to subscriber-set bookkeeping.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    /// Subscribers indexed by topic. Never holds an empty set.
    topics: HashMap<String, HashSet<ConnectionId>>,
    /// Topics indexed by connection. Never holds an empty set.
    by_connection: HashMap<ConnectionId, HashSet<String>>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a topic.
    ///
    /// Returns `true` if the pair is new, `false` if it already existed.
    pub fn subscribe(&mut self, connection: &ConnectionId, topic: &str) -> bool {
        let added = self
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(connection.clone());

        if added {
            self.by_connection
                .entry(connection.clone())
                .or_default()
                .insert(topic.to_string());
            debug!(topic = %topic, connection = %connection, "Connection subscribed");
        }

        added
    }

    /// Unsubscribe a connection from a topic, deleting the topic if it empties.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, connection: &ConnectionId, topic: &str) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        if !subscribers.remove(connection) {
            return false;
        }
        if subscribers.is_empty() {
            self.topics.remove(topic);
            debug!(topic = %topic, "Deleted empty topic");
        }

        if let Some(topics) = self.by_connection.get_mut(connection) {
            topics.remove(topic);
            if topics.is_empty() {
                self.by_connection.remove(connection);
            }
        }

        debug!(topic = %topic, connection = %connection, "Connection unsubscribed");
        true
    }

    /// Remove a connection from every topic it subscribed to.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unregister_all(&mut self, connection: &ConnectionId) -> usize {
        let Some(topics) = self.by_connection.remove(connection) else {
            return 0;
        };

        for topic in &topics {
            if let Some(subscribers) = self.topics.get_mut(topic) {
                subscribers.remove(connection);
                if subscribers.is_empty() {
                    self.topics.remove(topic);
                    debug!(topic = %topic, "Deleted empty topic");
                }
            }
        }

        topics.len()
    }

    /// Get the subscribers of a topic.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Option<&HashSet<ConnectionId>> {
        self.topics.get(topic)
    }

    /// Check if a connection is subscribed to a topic.
    #[must_use]
    pub fn is_subscribed(&self, connection: &ConnectionId, topic: &str) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|subscribers| subscribers.contains(connection))
    }

    /// Get the number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Get all topics with at least one subscriber.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Get the subscriber count of every topic.
    #[must_use]
    pub fn counts(&self) -> HashMap<String, usize> {
        self.topics
            .iter()
            .map(|(topic, subscribers)| (topic.clone(), subscribers.len()))
            .collect()
    }

    /// Get the number of topics a connection is subscribed to.
    #[must_use]
    pub fn subscription_count(&self, connection: &ConnectionId) -> usize {
        self.by_connection.get(connection).map_or(0, HashSet::len)
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.topics.clear();
        self.by_connection.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut index = SubscriptionIndex::new();

        assert!(index.subscribe(&id("conn-1"), "abc123"));
        assert!(index.is_subscribed(&id("conn-1"), "abc123"));
        assert_eq!(index.topic_count(), 1);

        assert!(index.unsubscribe(&id("conn-1"), "abc123"));
        assert!(!index.is_subscribed(&id("conn-1"), "abc123"));
        // Topic should be deleted once empty
        assert_eq!(index.topic_count(), 0);
        assert!(index.subscribers("abc123").is_none());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut index = SubscriptionIndex::new();

        assert!(index.subscribe(&id("conn-1"), "abc123"));
        assert!(!index.subscribe(&id("conn-1"), "abc123"));

        assert_eq!(index.counts().get("abc123"), Some(&1));
        assert_eq!(index.subscription_count(&id("conn-1")), 1);
    }

    #[test]
    fn test_unsubscribe_never_subscribed() {
        let mut index = SubscriptionIndex::new();
        index.subscribe(&id("conn-1"), "abc123");

        assert!(!index.unsubscribe(&id("conn-2"), "abc123"));
        assert!(!index.unsubscribe(&id("conn-1"), "xyz999"));
        assert_eq!(index.counts().get("abc123"), Some(&1));
    }

    #[test]
    fn test_unregister_all() {
        let mut index = SubscriptionIndex::new();
        index.subscribe(&id("conn-1"), "topic-1");
        index.subscribe(&id("conn-1"), "topic-2");
        index.subscribe(&id("conn-2"), "topic-2");

        assert_eq!(index.unregister_all(&id("conn-1")), 2);

        assert!(index.subscribers("topic-1").is_none());
        assert_eq!(index.counts().get("topic-2"), Some(&1));
        assert_eq!(index.subscription_count(&id("conn-1")), 0);

        // Second call is a no-op
        assert_eq!(index.unregister_all(&id("conn-1")), 0);
    }

    #[test]
    fn test_counts() {
        let mut index = SubscriptionIndex::new();
        index.subscribe(&id("conn-1"), "channel-1");
        index.subscribe(&id("conn-1"), "channel-2");
        index.subscribe(&id("conn-2"), "channel-1");

        let counts = index.counts();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["channel-1"], 2);
        assert_eq!(counts["channel-2"], 1);
    }

    #[test]
    fn test_matches_model_over_operation_sequence() {
        // Deterministic pseudo-random walk over subscribe/unsubscribe/disconnect,
        // checked against a flat set of (connection, topic) pairs.
        let connections = ["c0", "c1", "c2", "c3"];
        let topics = ["t0", "t1", "t2"];
        let mut index = SubscriptionIndex::new();
        let mut model: HashSet<(String, String)> = HashSet::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let conn = connections[(seed % 4) as usize];
            let topic = topics[((seed >> 8) % 3) as usize];

            match (seed >> 16) % 5 {
                0 | 1 => {
                    index.subscribe(&id(conn), topic);
                    model.insert((conn.to_string(), topic.to_string()));
                }
                2 | 3 => {
                    index.unsubscribe(&id(conn), topic);
                    model.remove(&(conn.to_string(), topic.to_string()));
                }
                _ => {
                    index.unregister_all(&id(conn));
                    model.retain(|(c, _)| c != conn);
                }
            }

            for c in connections {
                for t in topics {
                    assert_eq!(
                        index.is_subscribed(&id(c), t),
                        model.contains(&(c.to_string(), t.to_string()))
                    );
                }
            }
            for (_, count) in index.counts() {
                assert!(count > 0);
            }
        }
    }
}
