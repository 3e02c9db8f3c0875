//! Channel management endpoints.

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::models::{ChannelMemberRow, ChannelRow};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ChannelCreate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

/// Create a new channel (admin only). The creator is automatically joined.
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserIdQuery>,
    Json(req): Json<ChannelCreate>,
) -> Result<Json<ChannelRow>, ApiError> {
    let user = state
        .store
        .user_by_id(&query.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden(
            "Only admins can create channels".into(),
        ));
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Channel name is required".into()));
    }
    if state.store.channel_by_name(name).await?.is_some() {
        return Err(ApiError::BadRequest("Channel already exists".into()));
    }

    let channel = state.store.create_channel(name).await?;
    state.store.add_member(&user.id, &channel.id).await?;

    info!(channel = %channel.name, admin = %user.name, "channel created");
    Ok(Json(channel))
}

/// List all channels.
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChannelRow>>, ApiError> {
    Ok(Json(state.store.list_channels().await?))
}

/// Get channel by ID.
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelRow>, ApiError> {
    let channel = state
        .store
        .channel_by_id(&channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))?;
    Ok(Json(channel))
}

/// Join a channel.
pub async fn join_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
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

    if state.store.is_member(&user.id, &channel.id).await? {
        return Err(ApiError::BadRequest("User already in channel".into()));
    }

    state.store.add_member(&user.id, &channel.id).await?;
    info!(user = %user.name, channel = %channel.name, "user joined channel");

    Ok(Json(serde_json::json!({
        "message": "Joined channel",
        "user_id": user.id,
        "channel_id": channel.id,
    })))
}

/// Get all members in a channel.
pub async fn get_members(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Vec<ChannelMemberRow>>, ApiError> {
    state
        .store
        .channel_by_id(&channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))?;
    Ok(Json(state.store.channel_members(&channel_id).await?))
}
