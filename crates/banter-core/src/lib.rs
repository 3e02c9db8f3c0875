//! # banter-core
//!
//! Presence tracking, session lifecycle, and message fan-out for the
//! banter chat backend.
//!
//! This crate provides the live-messaging building blocks:
//!
//! - **Registry** - Routing key to live-session presence index
//! - **Session** - Per-connection lifecycle with scoped teardown
//! - **MessageRouter** - Validate, persist, and fan out inbound frames
//! - **Broadcaster** - At-most-once fan-out with isolated send failures
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│   Router    │────▶│ Broadcaster │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                      Registry                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Persistence and authorization are external collaborators behind the
//! [`MessageStore`] and [`MembershipGate`] traits; the core never talks to
//! storage directly.

pub mod broadcast;
pub mod registry;
pub mod router;
pub mod routing;
pub mod session;

pub use broadcast::Broadcaster;
pub use registry::{Registry, RegistryStats};
pub use router::{MembershipGate, MessageRouter, MessageStore, NewMessage, RouteOutcome, StoreError};
pub use routing::RoutingKey;
pub use session::{ConnectionId, Outbound, Session, SessionState, Subscriber};
