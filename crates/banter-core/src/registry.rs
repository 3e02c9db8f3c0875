//! The presence registry: routing key to live-session index.
//!
//! This is the sole shared mutable structure in the live-messaging core.
//! All mutation goes through [`Registry::register`] and
//! [`Registry::unregister`]; broadcast reads go through
//! [`Registry::snapshot`]. Snapshots may be stale by the time the caller
//! acts on them, which is acceptable for presence.

use crate::routing::RoutingKey;
use crate::session::{ConnectionId, Subscriber};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Maps each routing key to the set of live sessions subscribed to it.
///
/// Invariant: a key is present in the map iff at least one live session is
/// registered under it; entries are removed eagerly when their last
/// session leaves.
#[derive(Debug, Default)]
pub struct Registry {
    entries: DashMap<RoutingKey, HashMap<ConnectionId, Subscriber>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to the set for a routing key, creating the entry if
    /// absent. Idempotent: re-registering the same connection replaces its
    /// existing slot rather than duplicating it.
    pub fn register(&self, key: &RoutingKey, subscriber: Subscriber) {
        let connection_id = subscriber.connection_id();
        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.insert(connection_id, subscriber);
        debug!(key = %key, connection = %connection_id, sessions = entry.len(), "registered");
    }

    /// Remove a session from a routing key's set, deleting the entry
    /// entirely if it empties. Silently does nothing if the pair was never
    /// registered: disconnect cleanup runs unconditionally on every exit
    /// path.
    pub fn unregister(&self, key: &RoutingKey, connection_id: ConnectionId) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.remove(&connection_id).is_some() {
                debug!(key = %key, connection = %connection_id, sessions = entry.len(), "unregistered");
            }
        }
        self.entries.remove_if(key, |_, sessions| sessions.is_empty());
    }

    /// Snapshot of the user ids currently present on a routing key.
    ///
    /// Returns an empty set for unknown keys. The snapshot is eventually
    /// consistent: it may be stale by the time the caller acts on it.
    #[must_use]
    pub fn members_of(&self, key: &RoutingKey) -> HashSet<String> {
        self.entries
            .get(key)
            .map(|entry| {
                entry
                    .values()
                    .map(|s| s.user_id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Point-in-time copy of the sessions registered under a key, for
    /// fan-out. Copying out avoids iterating a set that connect/disconnect
    /// may mutate concurrently.
    #[must_use]
    pub fn snapshot(&self, key: &RoutingKey) -> Vec<Subscriber> {
        self.entries
            .get(key)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            key_count: self.entries.len(),
            session_count: self.entries.iter().map(|e| e.len()).sum(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of routing keys with at least one live session.
    pub key_count: usize,
    /// Total registered sessions across all keys.
    pub session_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::sync::Arc;

    fn subscriber(registry: &Arc<Registry>, user: &str) -> (Session, Subscriber) {
        let (session, _rx) =
            Session::connect(Arc::clone(registry), user, RoutingKey::channel("unused"));
        let sub = session.subscriber();
        (session, sub)
    }

    #[tokio::test]
    async fn test_register_unregister_members() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");
        let (_s1, sub1) = subscriber(&registry, "u-1");
        let (_s2, sub2) = subscriber(&registry, "u-2");
        let id1 = sub1.connection_id();

        registry.register(&key, sub1);
        registry.register(&key, sub2);
        assert_eq!(registry.members_of(&key).len(), 2);

        registry.unregister(&key, id1);
        let members = registry.members_of(&key);
        assert!(!members.contains("u-1"));
        assert!(members.contains("u-2"));
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");
        let (_s, sub) = subscriber(&registry, "u-1");

        registry.register(&key, sub.clone());
        registry.register(&key, sub);
        assert_eq!(registry.stats().session_count, 1);
    }

    #[tokio::test]
    async fn test_empty_entries_removed_eagerly() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");
        let (_s, sub) = subscriber(&registry, "u-1");
        let id = sub.connection_id();

        registry.register(&key, sub);
        assert_eq!(registry.stats().key_count, 1);

        registry.unregister(&key, id);
        assert_eq!(registry.stats().key_count, 0);
        assert!(registry.members_of(&key).is_empty());
    }

    #[tokio::test]
    async fn test_unregister_unknown_pair_is_noop() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("ghost");
        let (_s, sub) = subscriber(&registry, "u-1");

        // Never registered: must not panic or create entries.
        registry.unregister(&key, sub.connection_id());
        assert_eq!(registry.stats().key_count, 0);
    }

    #[tokio::test]
    async fn test_members_of_unknown_key_is_empty() {
        let registry = Registry::new();
        assert!(registry.members_of(&RoutingKey::peer("nobody")).is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let registry = Arc::new(Registry::new());
        let general = RoutingKey::channel("general");
        let random = RoutingKey::channel("random");
        let (_s1, sub1) = subscriber(&registry, "u-1");
        let (_s2, sub2) = subscriber(&registry, "u-2");

        registry.register(&general, sub1);
        registry.register(&random, sub2);

        assert!(!registry.members_of(&general).contains("u-2"));
        assert!(!registry.members_of(&random).contains("u-1"));
    }

    #[tokio::test]
    async fn test_same_user_two_connections() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");
        let (_s1, sub1) = subscriber(&registry, "u-1");
        let (_s2, sub2) = subscriber(&registry, "u-1");
        let id1 = sub1.connection_id();

        registry.register(&key, sub1);
        registry.register(&key, sub2);
        assert_eq!(registry.stats().session_count, 2);
        // Presence is per-user: two tabs are one identity.
        assert_eq!(registry.members_of(&key).len(), 1);

        // Dropping one connection keeps the user present.
        registry.unregister(&key, id1);
        assert!(registry.members_of(&key).contains("u-1"));
    }
}
