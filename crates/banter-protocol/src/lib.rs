//! # banter-protocol
//!
//! Wire protocol definitions for the banter chat backend.
//!
//! This crate defines the JSON text frames exchanged between chat clients
//! and the server: inbound payload resolution (structured key-value vs.
//! raw text) and the typed outbound frames.
//!
//! ## Frame Types
//!
//! - `message` - A persisted chat message, fanned out to a routing key
//! - `ack` - Peer-mode delivery acknowledgment to the sender
//! - `user_joined` / `user_left` - Channel presence changes
//! - `{error: ...}` - Per-frame error replies
//!
//! ## Example
//!
//! ```rust
//! use banter_protocol::{codec, Inbound};
//!
//! // Structured payloads have their content extracted...
//! let inbound = codec::decode_inbound(r#"{"content": "hello"}"#);
//! assert_eq!(inbound.content(), "hello");
//!
//! // ...anything else is accepted verbatim as raw content.
//! let raw = codec::decode_inbound("hello");
//! assert_eq!(raw, Inbound::Raw("hello".into()));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode_inbound, encode, ProtocolError};
pub use frames::{CanonicalMessage, FrameKind, Inbound, MessageStatus, ServerFrame};
