//! Frame types for the banter wire protocol.
//!
//! All frames travel as JSON text over the WebSocket. Inbound frames are
//! resolved into [`Inbound`] once at decode time; outbound frames are the
//! [`ServerFrame`] variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Stored, but no live session has received it yet.
    NotReceived,
    /// At least one live session of the receiver was reached.
    Received,
    /// The receiver has read the message.
    Read,
}

impl MessageStatus {
    /// Get the status as its wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::NotReceived => "not_received",
            MessageStatus::Received => "received",
            MessageStatus::Read => "read",
        }
    }

    /// Parse a status from its wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_received" => Some(MessageStatus::NotReceived),
            "received" => Some(MessageStatus::Received),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// The durably persisted, server-assigned representation of a chat message.
///
/// Produced exclusively by the persistence layer and never mutated before
/// broadcast, so every recipient sees identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Server-assigned message id.
    pub id: String,
    /// Target channel, for channel messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Target user, for peer-to-peer messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    /// Authoring user.
    pub sender_id: String,
    /// Message body.
    pub content: String,
    /// Delivery status at persistence time.
    pub status: MessageStatus,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A decoded inbound client frame.
///
/// The payload shape is resolved exactly once at decode time: structured
/// key-value data yields [`Inbound::Structured`], any other well-formed
/// text is carried verbatim as [`Inbound::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A JSON object payload with an extracted `content` field.
    Structured {
        /// Target user for peer-to-peer sends.
        receiver_id: Option<String>,
        /// Message body, trimmed.
        content: String,
    },
    /// Plain text used verbatim as message content, trimmed.
    Raw(String),
}

impl Inbound {
    /// The message content carried by this frame.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Inbound::Structured { content, .. } => content,
            Inbound::Raw(content) => content,
        }
    }

    /// The peer-mode receiver, if the frame named one.
    #[must_use]
    pub fn receiver_id(&self) -> Option<&str> {
        match self {
            Inbound::Structured { receiver_id, .. } => receiver_id.as_deref(),
            Inbound::Raw(_) => None,
        }
    }
}

/// Discriminator carried in the `type` field of outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Message,
    Ack,
    UserJoined,
    UserLeft,
}

/// A channel-mode message broadcast: flat fields, as channel clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A peer-mode acknowledgment, sent to the sender only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Whether the receiver had at least one live session at broadcast time.
    pub delivered: bool,
    pub message: CanonicalMessage,
}

/// A peer-mode message push: the canonical record nested whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub message: CanonicalMessage,
}

/// A channel presence change, broadcast to the whole room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub user_id: String,
    pub online_users: Vec<String>,
}

/// An error reply to the offending sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// An outbound server frame.
///
/// Untagged on purpose: the channel-mode and peer-mode message frames both
/// carry `type: "message"` with different bodies, which an internally
/// tagged enum cannot express. Each body struct carries its own `type`
/// field instead. Variant order matters for deserialization: `Ack` must be
/// tried before `Direct` since its fields are a superset of `Direct`'s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Message(MessageFrame),
    Ack(AckFrame),
    Direct(DirectFrame),
    Presence(PresenceFrame),
    Error(ErrorFrame),
}

impl ServerFrame {
    /// Create a channel-mode message frame from a canonical record.
    #[must_use]
    pub fn channel_message(message: &CanonicalMessage) -> Self {
        ServerFrame::Message(MessageFrame {
            kind: FrameKind::Message,
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
        })
    }

    /// Create a peer-mode message frame carrying the canonical record.
    #[must_use]
    pub fn direct_message(message: CanonicalMessage) -> Self {
        ServerFrame::Direct(DirectFrame {
            kind: FrameKind::Message,
            message,
        })
    }

    /// Create a peer-mode delivery acknowledgment.
    #[must_use]
    pub fn ack(delivered: bool, message: CanonicalMessage) -> Self {
        ServerFrame::Ack(AckFrame {
            kind: FrameKind::Ack,
            delivered,
            message,
        })
    }

    /// Create a `user_joined` presence frame. The user list is sorted so
    /// identical presence states serialize identically.
    #[must_use]
    pub fn user_joined(user_id: impl Into<String>, mut online_users: Vec<String>) -> Self {
        online_users.sort_unstable();
        ServerFrame::Presence(PresenceFrame {
            kind: FrameKind::UserJoined,
            user_id: user_id.into(),
            online_users,
        })
    }

    /// Create a `user_left` presence frame.
    #[must_use]
    pub fn user_left(user_id: impl Into<String>, mut online_users: Vec<String>) -> Self {
        online_users.sort_unstable();
        ServerFrame::Presence(PresenceFrame {
            kind: FrameKind::UserLeft,
            user_id: user_id.into(),
            online_users,
        })
    }

    /// Create an error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorFrame {
            error: message.into(),
        })
    }
}
