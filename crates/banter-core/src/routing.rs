//! Routing keys for the banter presence registry.
//!
//! A routing key groups the live connections that should receive the same
//! broadcast: a channel room, or a single user's peer-to-peer inbox. The
//! registry treats keys as opaque map keys; the enum only exists so the
//! two namespaces can never collide.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the set of live connections a broadcast is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingKey {
    /// A channel room: every member session subscribes to this key.
    Channel(String),
    /// A user's peer-to-peer inbox: every session of that user subscribes.
    Peer(String),
}

impl RoutingKey {
    /// Create a channel routing key.
    #[must_use]
    pub fn channel(id: impl Into<String>) -> Self {
        RoutingKey::Channel(id.into())
    }

    /// Create a peer routing key.
    #[must_use]
    pub fn peer(user_id: impl Into<String>) -> Self {
        RoutingKey::Peer(user_id.into())
    }

    /// Whether this key addresses a shared channel room.
    #[must_use]
    pub fn is_channel(&self) -> bool {
        matches!(self, RoutingKey::Channel(_))
    }

    /// The underlying identifier (channel id or user id).
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            RoutingKey::Channel(id) | RoutingKey::Peer(id) => id,
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKey::Channel(id) => write!(f, "channel:{id}"),
            RoutingKey::Peer(id) => write!(f, "peer:{id}"),
        }
    }
}
