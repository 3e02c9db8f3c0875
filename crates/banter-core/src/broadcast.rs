//! Fan-out of frames to every session on a routing key.
//!
//! The engine serializes a frame once, snapshots the key's sessions, and
//! queues the payload to each independently: one dead connection never
//! blocks delivery to the rest, and per-recipient ordering follows from
//! each connection's single outbound queue.

use crate::registry::Registry;
use crate::routing::RoutingKey;
use banter_protocol::{codec, ServerFrame};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Broadcast engine over a shared [`Registry`].
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver a frame to every session currently registered under a key.
    ///
    /// Returns the number of sessions the frame was queued to. A failure to
    /// queue for one session is logged and skipped; it never aborts
    /// delivery to the remaining sessions and never unregisters the
    /// session here (removal is owned by that session's own lifecycle).
    ///
    /// Synchronous by design: queueing to an unbounded channel cannot
    /// block, so no registry lock is ever held across a suspension point
    /// and teardown paths may broadcast freely.
    pub fn broadcast(&self, key: &RoutingKey, frame: &ServerFrame) -> usize {
        let recipients = self.registry.snapshot(key);
        if recipients.is_empty() {
            trace!(key = %key, "broadcast to empty key");
            return 0;
        }

        // Serialize once so every recipient sees byte-identical payloads.
        let payload = match codec::encode(frame) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %key, error = %e, "failed to encode broadcast frame");
                return 0;
            }
        };

        let mut reached = 0;
        for subscriber in recipients {
            match subscriber.deliver(payload.clone()) {
                Ok(()) => reached += 1,
                Err(_) => warn!(
                    key = %key,
                    connection = %subscriber.connection_id(),
                    "failed to queue frame for delivery"
                ),
            }
        }

        trace!(key = %key, recipients = reached, "broadcast");
        reached
    }
}
