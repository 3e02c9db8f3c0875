//! SQLite-backed store for users, channels, membership, and messages.
//!
//! Implements the live-messaging core's collaborator traits: message
//! persistence ([`MessageStore`]) and membership checks
//! ([`MembershipGate`]), alongside the queries the HTTP API needs.

use async_trait::async_trait;
use banter_core::{MembershipGate, MessageStore, NewMessage, RoutingKey, StoreError};
use banter_protocol::{CanonicalMessage, MessageStatus};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::models::{ChannelMemberRow, ChannelRow, MessageRow, Role, UserRow};

/// Map a database failure into the core's collaborator error.
fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// The relational store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over an initialized pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // --- users ---

    /// Insert a new user. The password must already be hashed.
    pub async fn create_user(
        &self,
        name: &str,
        password_hash: &str,
        role: Role,
    ) -> sqlx::Result<UserRow> {
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            password: password_hash.to_string(),
            role: role.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, name, password, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.password)
        .bind(&row.role)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn user_by_id(&self, id: &str) -> sqlx::Result<Option<UserRow>> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn user_by_name(&self, name: &str) -> sqlx::Result<Option<UserRow>> {
        sqlx::query_as("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_users(&self) -> sqlx::Result<Vec<UserRow>> {
        sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }

    // --- channels ---

    pub async fn create_channel(&self, name: &str) -> sqlx::Result<ChannelRow> {
        let row = ChannelRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO channels (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn channel_by_id(&self, id: &str) -> sqlx::Result<Option<ChannelRow>> {
        sqlx::query_as("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn channel_by_name(&self, name: &str) -> sqlx::Result<Option<ChannelRow>> {
        sqlx::query_as("SELECT * FROM channels WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_channels(&self) -> sqlx::Result<Vec<ChannelRow>> {
        sqlx::query_as("SELECT * FROM channels ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }

    // --- membership ---

    pub async fn add_member(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> sqlx::Result<ChannelMemberRow> {
        let row = ChannelMemberRow {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            joined_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO channel_members (user_id, channel_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(&row.user_id)
        .bind(&row.channel_id)
        .bind(row.joined_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn is_member(&self, user_id: &str, channel_id: &str) -> sqlx::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM channel_members WHERE user_id = ? AND channel_id = ?",
        )
        .bind(user_id)
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn channel_members(&self, channel_id: &str) -> sqlx::Result<Vec<ChannelMemberRow>> {
        sqlx::query_as(
            "SELECT * FROM channel_members WHERE channel_id = ? ORDER BY joined_at ASC",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- messages ---

    /// Insert a message addressed to a routing key.
    pub async fn insert_message(
        &self,
        key: &RoutingKey,
        sender_id: &str,
        content: &str,
    ) -> sqlx::Result<MessageRow> {
        let (channel_id, receiver_id) = match key {
            RoutingKey::Channel(id) => (Some(id.clone()), None),
            RoutingKey::Peer(id) => (None, Some(id.clone())),
        };
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            channel_id,
            sender_id: sender_id.to_string(),
            receiver_id,
            content: content.to_string(),
            status: MessageStatus::NotReceived.as_str().to_string(),
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO messages \
             (id, channel_id, sender_id, receiver_id, content, status, is_deleted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.channel_id)
        .bind(&row.sender_id)
        .bind(&row.receiver_id)
        .bind(&row.content)
        .bind(&row.status)
        .bind(row.is_deleted)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    /// Channel history, oldest first, soft-deleted messages excluded.
    pub async fn channel_history(&self, channel_id: &str) -> sqlx::Result<Vec<MessageRow>> {
        sqlx::query_as(
            "SELECT * FROM messages WHERE channel_id = ? AND is_deleted = 0 \
             ORDER BY created_at ASC",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Conversation between two users, both directions, oldest first.
    pub async fn conversation(&self, user_a: &str, user_b: &str) -> sqlx::Result<Vec<MessageRow>> {
        sqlx::query_as(
            "SELECT * FROM messages \
             WHERE ((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)) \
             AND is_deleted = 0 ORDER BY created_at ASC",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.pool)
        .await
    }

    /// Flag a message as deleted. Returns `false` if no such message.
    pub async fn soft_delete_message(&self, message_id: &str) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE messages SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_message_status(&self, message_id: &str, status: MessageStatus) -> sqlx::Result<()> {
        sqlx::query("UPDATE messages SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn persist(&self, message: NewMessage) -> Result<CanonicalMessage, StoreError> {
        let row = self
            .insert_message(&message.key, &message.sender_id, &message.content)
            .await
            .map_err(backend)?;
        Ok(row.into_canonical())
    }

    async fn mark_received(&self, message_id: &str) -> Result<(), StoreError> {
        self.set_message_status(message_id, MessageStatus::Received)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl MembershipGate for SqliteStore {
    async fn is_authorized(&self, user_id: &str, key: &RoutingKey) -> Result<bool, StoreError> {
        match key {
            RoutingKey::Channel(channel_id) => {
                self.is_member(user_id, channel_id).await.map_err(backend)
            }
            // Peer traffic is allowed between any two registered users;
            // the gate only refuses unknown receivers.
            RoutingKey::Peer(receiver_id) => Ok(self
                .user_by_id(receiver_id)
                .await
                .map_err(backend)?
                .is_some()),
        }
    }
}
