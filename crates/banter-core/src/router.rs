//! Message routing: validate, persist, fan out.
//!
//! The router is the receive-and-route entry point for inbound client
//! frames. It validates membership through the external authorization
//! collaborator, persists through the external store, and hands the
//! resulting canonical record to the broadcast engine. It holds no registry
//! lock across either external call.

use crate::broadcast::Broadcaster;
use crate::registry::Registry;
use crate::routing::RoutingKey;
use crate::session::Session;
use async_trait::async_trait;
use banter_protocol::{codec, CanonicalMessage, ServerFrame};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors surfaced by the persistence and authorization collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A message as submitted for persistence, before the store assigns its
/// canonical identity.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Target routing key.
    pub key: RoutingKey,
    /// Authoring user.
    pub sender_id: String,
    /// Message body, already trimmed and known non-empty.
    pub content: String,
}

/// Durable message persistence, provided by the relational layer.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably store a message and return its canonical record.
    async fn persist(&self, message: NewMessage) -> Result<CanonicalMessage, StoreError>;

    /// Mark a stored message as received by a live session.
    async fn mark_received(&self, message_id: &str) -> Result<(), StoreError>;
}

/// Membership and permission checks, provided by the relational layer.
#[async_trait]
pub trait MembershipGate: Send + Sync {
    /// Whether `user_id` is authorized to exchange traffic on `key`.
    async fn is_authorized(&self, user_id: &str, key: &RoutingKey) -> Result<bool, StoreError>;
}

/// What happened to one routed frame.
///
/// Tells the transport layer whether anything beyond logging is needed;
/// only `CloseUnauthorized` terminates the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The message was persisted and fanned out to this many sessions.
    Delivered { recipients: usize },
    /// The frame was refused and an error reply was queued to the sender.
    Rejected,
    /// Channel-mode authorization denial: close the connection.
    CloseUnauthorized,
    /// An internal failure was logged and the frame discarded.
    Dropped,
}

/// Routes inbound frames from open sessions.
#[derive(Clone)]
pub struct MessageRouter {
    broadcaster: Broadcaster,
    store: Arc<dyn MessageStore>,
    gate: Arc<dyn MembershipGate>,
}

impl MessageRouter {
    /// Create a router over the shared registry and its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn MessageStore>,
        gate: Arc<dyn MembershipGate>,
    ) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
            store,
            gate,
        }
    }

    /// The broadcast engine, shared with non-WebSocket message producers.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Process one inbound text frame from an open session.
    ///
    /// Every failure mode is resolved here: malformed input earns the
    /// sender an error reply, internal failures are logged and the frame
    /// discarded. The caller only has to act on `CloseUnauthorized`.
    pub async fn route(&self, session: &Session, raw: &str) -> RouteOutcome {
        let inbound = codec::decode_inbound(raw);

        if inbound.content().is_empty() {
            session.reply(&ServerFrame::error("Empty message"));
            return RouteOutcome::Rejected;
        }

        let target = if session.is_channel_mode() {
            session.origin().clone()
        } else {
            match inbound.receiver_id() {
                Some(receiver) => RoutingKey::peer(receiver),
                None => {
                    session.reply(&ServerFrame::error("missing_fields"));
                    return RouteOutcome::Rejected;
                }
            }
        };

        match self.gate.is_authorized(session.user_id(), &target).await {
            Ok(true) => {}
            Ok(false) => {
                if session.is_channel_mode() {
                    warn!(connection = %session.id(), key = %target, "unauthorized send, closing");
                    return RouteOutcome::CloseUnauthorized;
                }
                session.reply(&ServerFrame::error("unauthorized"));
                return RouteOutcome::Rejected;
            }
            Err(e) => {
                error!(connection = %session.id(), key = %target, error = %e, "authorization check failed");
                return RouteOutcome::Dropped;
            }
        }

        let message = match self
            .store
            .persist(NewMessage {
                key: target.clone(),
                sender_id: session.user_id().to_string(),
                content: inbound.content().to_string(),
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                // Never broadcast content that failed to durably persist.
                error!(connection = %session.id(), key = %target, error = %e, "persist failed, dropping frame");
                return RouteOutcome::Dropped;
            }
        };

        let recipients = if session.is_channel_mode() {
            self.broadcaster
                .broadcast(&target, &ServerFrame::channel_message(&message))
        } else {
            self.deliver_direct(session, &target, message).await
        };

        debug!(connection = %session.id(), key = %target, recipients, "message routed");
        RouteOutcome::Delivered { recipients }
    }

    /// Peer-mode delivery: push to the receiver's sessions, acknowledge to
    /// the sender. `delivered` reports whether the receiver had at least
    /// one live session at broadcast time; there is no backlog for
    /// receivers who connect later.
    async fn deliver_direct(
        &self,
        session: &Session,
        target: &RoutingKey,
        message: CanonicalMessage,
    ) -> usize {
        let recipients = self
            .broadcaster
            .broadcast(target, &ServerFrame::direct_message(message.clone()));
        let delivered = recipients > 0;

        if delivered {
            if let Err(e) = self.store.mark_received(&message.id).await {
                warn!(message = %message.id, error = %e, "failed to mark message received");
            }
        }

        session.reply(&ServerFrame::ack(delivered, message));
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Outbound;
    use banter_protocol::MessageStatus;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// In-memory store: counts persists, optionally fails them.
    #[derive(Default)]
    struct MemoryStore {
        persisted: AtomicUsize,
        fail: AtomicBool,
        received: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn persist(&self, message: NewMessage) -> Result<CanonicalMessage, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".into()));
            }
            let n = self.persisted.fetch_add(1, Ordering::SeqCst);
            let (channel_id, receiver_id) = match &message.key {
                RoutingKey::Channel(id) => (Some(id.clone()), None),
                RoutingKey::Peer(id) => (None, Some(id.clone())),
            };
            Ok(CanonicalMessage {
                id: format!("m-{n}"),
                channel_id,
                receiver_id,
                sender_id: message.sender_id,
                content: message.content,
                status: MessageStatus::NotReceived,
                created_at: Utc::now(),
            })
        }

        async fn mark_received(&self, message_id: &str) -> Result<(), StoreError> {
            self.received.lock().await.push(message_id.to_string());
            Ok(())
        }
    }

    /// Gate that authorizes everything except a deny-listed user.
    #[derive(Default)]
    struct OpenGate {
        denied: Option<String>,
    }

    #[async_trait]
    impl MembershipGate for OpenGate {
        async fn is_authorized(&self, user_id: &str, _key: &RoutingKey) -> Result<bool, StoreError> {
            Ok(self.denied.as_deref() != Some(user_id))
        }
    }

    struct Fixture {
        registry: Arc<Registry>,
        store: Arc<MemoryStore>,
        router: MessageRouter,
    }

    impl Fixture {
        fn new(gate: OpenGate) -> Self {
            let registry = Arc::new(Registry::new());
            let store = Arc::new(MemoryStore::default());
            let router = MessageRouter::new(
                Arc::clone(&registry),
                Arc::clone(&store) as Arc<dyn MessageStore>,
                Arc::new(gate),
            );
            Self {
                registry,
                store,
                router,
            }
        }

        fn open_session(&self, user: &str, key: RoutingKey) -> (Session, Outbound) {
            let (mut session, rx) = Session::connect(Arc::clone(&self.registry), user, key);
            session.open();
            (session, rx)
        }
    }

    fn frame(rx: &mut Outbound) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().expect("frame queued")).unwrap()
    }

    #[tokio::test]
    async fn test_empty_content_rejected_without_persist_or_broadcast() {
        let fx = Fixture::new(OpenGate::default());
        let key = RoutingKey::channel("general");
        let (sender, mut sender_rx) = fx.open_session("u-1", key.clone());
        let (_other, mut other_rx) = fx.open_session("u-2", key);

        for raw in [r#"{"content": ""}"#, r#"{"content": "   "}"#, "   "] {
            assert_eq!(fx.router.route(&sender, raw).await, RouteOutcome::Rejected);
            assert_eq!(frame(&mut sender_rx)["error"], "Empty message");
        }
        assert_eq!(fx.store.persisted.load(Ordering::SeqCst), 0);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_message_reaches_all_members() {
        let fx = Fixture::new(OpenGate::default());
        let key = RoutingKey::channel("general");
        let (sender, mut sender_rx) = fx.open_session("u-1", key.clone());
        let (_other, mut other_rx) = fx.open_session("u-2", key);

        let outcome = fx.router.route(&sender, r#"{"content": "hi"}"#).await;
        assert_eq!(outcome, RouteOutcome::Delivered { recipients: 2 });

        for rx in [&mut sender_rx, &mut other_rx] {
            let value = frame(rx);
            assert_eq!(value["type"], "message");
            assert_eq!(value["content"], "hi");
            assert_eq!(value["sender_id"], "u-1");
        }
    }

    #[tokio::test]
    async fn test_raw_text_accepted_as_content() {
        let fx = Fixture::new(OpenGate::default());
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::channel("general"));

        let outcome = fx.router.route(&sender, "plain words").await;
        assert_eq!(outcome, RouteOutcome::Delivered { recipients: 1 });
        assert_eq!(frame(&mut sender_rx)["content"], "plain words");
    }

    #[tokio::test]
    async fn test_channel_denial_closes_connection() {
        let fx = Fixture::new(OpenGate {
            denied: Some("u-1".into()),
        });
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::channel("general"));

        let outcome = fx.router.route(&sender, r#"{"content": "hi"}"#).await;
        assert_eq!(outcome, RouteOutcome::CloseUnauthorized);
        assert_eq!(fx.store.persisted.load(Ordering::SeqCst), 0);
        // No error frame in channel mode: the close code carries the reason.
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_denial_replies_unauthorized() {
        let fx = Fixture::new(OpenGate {
            denied: Some("u-1".into()),
        });
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::peer("u-1"));

        let outcome = fx
            .router
            .route(&sender, r#"{"receiver_id": "u-2", "content": "hi"}"#)
            .await;
        assert_eq!(outcome, RouteOutcome::Rejected);
        assert_eq!(frame(&mut sender_rx)["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_peer_without_receiver_rejected() {
        let fx = Fixture::new(OpenGate::default());
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::peer("u-1"));

        let outcome = fx.router.route(&sender, r#"{"content": "hi"}"#).await;
        assert_eq!(outcome, RouteOutcome::Rejected);
        assert_eq!(frame(&mut sender_rx)["error"], "missing_fields");
        assert_eq!(fx.store.persisted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_drops_frame_silently() {
        let fx = Fixture::new(OpenGate::default());
        let key = RoutingKey::channel("general");
        let (sender, mut sender_rx) = fx.open_session("u-1", key.clone());
        let (_other, mut other_rx) = fx.open_session("u-2", key);
        fx.store.fail.store(true, Ordering::SeqCst);

        let outcome = fx.router.route(&sender, r#"{"content": "hi"}"#).await;
        assert_eq!(outcome, RouteOutcome::Dropped);
        // Never broadcast content that failed to persist; the connection
        // stays open and the sender gets no error frame.
        assert!(sender_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_delivery_with_live_receiver() {
        let fx = Fixture::new(OpenGate::default());
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::peer("u-1"));
        let (_receiver, mut receiver_rx) = fx.open_session("u-2", RoutingKey::peer("u-2"));

        let outcome = fx
            .router
            .route(&sender, r#"{"receiver_id": "u-2", "content": "hey"}"#)
            .await;
        assert_eq!(outcome, RouteOutcome::Delivered { recipients: 1 });

        let push = frame(&mut receiver_rx);
        assert_eq!(push["type"], "message");
        assert_eq!(push["message"]["content"], "hey");

        let ack = frame(&mut sender_rx);
        assert_eq!(ack["type"], "ack");
        assert_eq!(ack["delivered"], true);

        // Delivery marks the stored message received.
        let received = fx.store.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], "m-0");
    }

    #[tokio::test]
    async fn test_peer_delivery_with_offline_receiver() {
        let fx = Fixture::new(OpenGate::default());
        let (sender, mut sender_rx) = fx.open_session("u-1", RoutingKey::peer("u-1"));

        let outcome = fx
            .router
            .route(&sender, r#"{"receiver_id": "u-2", "content": "hey"}"#)
            .await;
        assert_eq!(outcome, RouteOutcome::Delivered { recipients: 0 });

        let ack = frame(&mut sender_rx);
        assert_eq!(ack["delivered"], false);
        // Still persisted: delivery state and durability are independent.
        assert_eq!(fx.store.persisted.load(Ordering::SeqCst), 1);
        assert!(fx.store.received.lock().await.is_empty());
    }
}
