//! Row and view types for the relational store.

use banter_protocol::{CanonicalMessage, MessageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// The role as its stored string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// A `users` table row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub password: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Whether this user holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

/// Public view of a user: everything but the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: String,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserOut {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A `channels` table row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `channel_members` table row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelMemberRow {
    pub user_id: String,
    pub channel_id: String,
    pub joined_at: DateTime<Utc>,
}

/// A `messages` table row.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: Option<String>,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub content: String,
    pub status: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRow {
    /// Convert into the canonical wire representation.
    #[must_use]
    pub fn into_canonical(self) -> CanonicalMessage {
        CanonicalMessage {
            id: self.id,
            channel_id: self.channel_id,
            receiver_id: self.receiver_id,
            sender_id: self.sender_id,
            content: self.content,
            status: MessageStatus::parse(&self.status).unwrap_or(MessageStatus::NotReceived),
            created_at: self.created_at,
        }
    }
}
