//! Connection sessions and their lifecycle.
//!
//! One [`Session`] exists per live connection. The transport task that
//! accepted the connection owns the session exclusively; the registry only
//! holds cloneable [`Subscriber`] views of it. Teardown is scoped to the
//! session's lifetime: dropping it unregisters every subscription and
//! announces the departure to channel rooms, on every exit path.

use crate::broadcast::Broadcaster;
use crate::registry::Registry;
use crate::routing::RoutingKey;
use banter_protocol::{codec, ServerFrame};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Monotonic counter backing [`ConnectionId::next`].
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a live connection within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{:x}", self.0)
    }
}

/// Connection lifecycle states.
///
/// `Connecting → Open` on a successful handshake; an authorization failure
/// at connect time goes straight to `Closed` without ever registering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Outbound frame queue feeding a connection's single writer.
pub type Outbound = mpsc::UnboundedReceiver<String>;

/// Registry-side view of a session: identity plus the outbound queue.
///
/// Cloneable and cheap; the registry never owns the socket itself.
#[derive(Debug, Clone)]
pub struct Subscriber {
    connection_id: ConnectionId,
    user_id: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl Subscriber {
    /// The connection this subscriber belongs to.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The authenticated user behind the connection.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue an already-serialized frame for delivery.
    ///
    /// Frames queued through the same subscriber reach the socket in
    /// queueing order: the connection's transport task is the sole writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection's writer has gone away.
    pub fn deliver(&self, payload: String) -> Result<(), mpsc::error::SendError<String>> {
        self.outbound.send(payload)
    }
}

/// The live, authenticated state of one open connection.
///
/// Owned by the transport task. Dropping the session runs teardown:
/// one `unregister` per subscribed key, then one `user_left` broadcast per
/// channel-mode key, each step independent of prior failures.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    user_id: String,
    origin: RoutingKey,
    state: SessionState,
    subscriptions: Vec<RoutingKey>,
    outbound: mpsc::UnboundedSender<String>,
    registry: Arc<Registry>,
}

impl Session {
    /// Create a session in the `Connecting` state.
    ///
    /// `origin` is the routing key the connection was established for: the
    /// channel being joined, or the user's own peer inbox. Returns the
    /// session and the receiving half of its outbound queue, which the
    /// transport task drains into the socket.
    #[must_use]
    pub fn connect(
        registry: Arc<Registry>,
        user_id: impl Into<String>,
        origin: RoutingKey,
    ) -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: ConnectionId::next(),
            user_id: user_id.into(),
            origin,
            state: SessionState::Connecting,
            subscriptions: Vec::new(),
            outbound: tx,
            registry,
        };
        (session, rx)
    }

    /// The connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The authenticated user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The routing key the connection was established for.
    #[must_use]
    pub fn origin(&self) -> &RoutingKey {
        &self.origin
    }

    /// Whether this session serves a shared channel room.
    #[must_use]
    pub fn is_channel_mode(&self) -> bool {
        self.origin.is_channel()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Registry-side view of this session.
    #[must_use]
    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            connection_id: self.id,
            user_id: self.user_id.clone(),
            outbound: self.outbound.clone(),
        }
    }

    /// Complete the handshake: register under the origin key and move to
    /// `Open`. Registering twice for the same key is harmless.
    pub fn open(&mut self) {
        self.subscribe(self.origin.clone());
        self.state = SessionState::Open;
        debug!(connection = %self.id, user = %self.user_id, key = %self.origin, "session open");
    }

    /// Register this session under an additional routing key.
    pub fn subscribe(&mut self, key: RoutingKey) {
        self.registry.register(&key, self.subscriber());
        if !self.subscriptions.contains(&key) {
            self.subscriptions.push(key);
        }
    }

    /// Queue a frame to this session only (error replies, acks).
    pub fn reply(&self, frame: &ServerFrame) {
        match codec::encode(frame) {
            Ok(payload) => {
                if self.outbound.send(payload).is_err() {
                    warn!(connection = %self.id, "reply dropped: writer gone");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "failed to encode reply"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.state = SessionState::Closing;

        let broadcaster = Broadcaster::new(Arc::clone(&self.registry));
        for key in std::mem::take(&mut self.subscriptions) {
            self.registry.unregister(&key, self.id);
            if key.is_channel() {
                // Announce after removal so the departing user is absent
                // from the broadcast presence list.
                let online: Vec<String> = self.registry.members_of(&key).into_iter().collect();
                broadcaster.broadcast(&key, &ServerFrame::user_left(self.user_id.clone(), online));
            }
        }

        self.state = SessionState::Closed;
        debug!(connection = %self.id, user = %self.user_id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn_"));
    }

    #[tokio::test]
    async fn test_session_open_registers_origin() {
        let registry = Arc::new(Registry::new());
        let (mut session, _rx) =
            Session::connect(Arc::clone(&registry), "u-1", RoutingKey::channel("general"));
        assert_eq!(session.state(), SessionState::Connecting);

        session.open();
        assert_eq!(session.state(), SessionState::Open);
        assert!(registry
            .members_of(&RoutingKey::channel("general"))
            .contains("u-1"));
    }

    #[tokio::test]
    async fn test_drop_unregisters_and_announces_departure() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");

        let (mut stayer, mut stayer_rx) =
            Session::connect(Arc::clone(&registry), "u-1", key.clone());
        stayer.open();

        let (mut leaver, _leaver_rx) = Session::connect(Arc::clone(&registry), "u-2", key.clone());
        leaver.open();
        assert_eq!(registry.members_of(&key).len(), 2);

        drop(leaver);

        assert_eq!(
            registry.members_of(&key),
            std::iter::once("u-1".to_string()).collect()
        );
        let payload = stayer_rx.try_recv().expect("user_left frame queued");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "user_left");
        assert_eq!(value["user_id"], "u-2");
        assert_eq!(value["online_users"], serde_json::json!(["u-1"]));
    }

    #[tokio::test]
    async fn test_drop_of_peer_session_is_silent() {
        let registry = Arc::new(Registry::new());

        let (mut a, _a_rx) = Session::connect(Arc::clone(&registry), "u-1", RoutingKey::peer("u-1"));
        a.open();
        let (mut b, mut b_rx) =
            Session::connect(Arc::clone(&registry), "u-2", RoutingKey::peer("u-2"));
        b.open();

        drop(a);

        // No shared room in peer mode: nobody is notified.
        assert!(b_rx.try_recv().is_err());
        assert!(registry.members_of(&RoutingKey::peer("u-1")).is_empty());
    }

    #[tokio::test]
    async fn test_reply_reaches_own_queue_only() {
        let registry = Arc::new(Registry::new());
        let key = RoutingKey::channel("general");
        let (mut a, mut a_rx) = Session::connect(Arc::clone(&registry), "u-1", key.clone());
        a.open();
        let (mut b, mut b_rx) = Session::connect(Arc::clone(&registry), "u-2", key.clone());
        b.open();

        a.reply(&ServerFrame::error("Empty message"));

        assert_eq!(a_rx.try_recv().unwrap(), r#"{"error":"Empty message"}"#);
        assert!(b_rx.try_recv().is_err());
    }
}
