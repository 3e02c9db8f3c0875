//! Message endpoints.
//!
//! REST sends share the live layer's broadcast engine: a message posted
//! over HTTP still reaches every connected WebSocket session on its
//! routing key.

use crate::error::ApiError;
use crate::handlers::channels::UserIdQuery;
use crate::handlers::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use banter_core::{MessageStore, NewMessage, RoutingKey};
use banter_protocol::{CanonicalMessage, ServerFrame};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ChannelMessageCreate {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DirectMessageCreate {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

/// Send a message to a channel.
pub async fn send_channel_message(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Query(query): Query<UserIdQuery>,
    Json(req): Json<ChannelMessageCreate>,
) -> Result<Json<CanonicalMessage>, ApiError> {
    let user = state
        .store
        .user_by_id(&query.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    let channel = state
        .store
        .channel_by_id(&channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))?;
    if !state.store.is_member(&user.id, &channel.id).await? {
        return Err(ApiError::Forbidden("Not a member of this channel".into()));
    }

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Empty message".into()));
    }

    let key = RoutingKey::channel(&channel.id);
    let message = state
        .store
        .persist(NewMessage {
            key: key.clone(),
            sender_id: user.id.clone(),
            content: content.to_string(),
        })
        .await?;

    state
        .router
        .broadcaster()
        .broadcast(&key, &ServerFrame::channel_message(&message));

    info!(channel = %channel.name, sender = %user.name, "message sent");
    Ok(Json(message))
}

/// Send a peer-to-peer message.
pub async fn send_direct_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DirectMessageCreate>,
) -> Result<Json<CanonicalMessage>, ApiError> {
    let sender = state
        .store
        .user_by_id(&req.sender_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Sender not found".into()))?;
    let receiver = state
        .store
        .user_by_id(&req.receiver_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Receiver not found".into()))?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Empty message".into()));
    }

    let key = RoutingKey::peer(&receiver.id);
    let message = state
        .store
        .persist(NewMessage {
            key: key.clone(),
            sender_id: sender.id.clone(),
            content: content.to_string(),
        })
        .await?;

    let recipients = state
        .router
        .broadcaster()
        .broadcast(&key, &ServerFrame::direct_message(message.clone()));
    if recipients > 0 {
        if let Err(e) = state.store.mark_received(&message.id).await {
            warn!(message = %message.id, error = %e, "failed to mark message received");
        }
    }

    info!(sender = %sender.name, receiver = %receiver.name, "direct message sent");
    Ok(Json(message))
}

/// Get all messages in a channel (channel history).
pub async fn channel_history(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Vec<CanonicalMessage>>, ApiError> {
    state
        .store
        .channel_by_id(&channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))?;

    let rows = state.store.channel_history(&channel_id).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_canonical()).collect()))
}

/// Get the conversation between two users.
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    Path((user_a, user_b)): Path<(String, String)>,
) -> Result<Json<Vec<CanonicalMessage>>, ApiError> {
    let rows = state.store.conversation(&user_a, &user_b).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_canonical()).collect()))
}

/// Soft-delete a message.
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.soft_delete_message(&message_id).await? {
        return Err(ApiError::NotFound("Message not found".into()));
    }
    Ok(Json(serde_json::json!({
        "message": "Message deleted",
        "id": message_id,
    })))
}
