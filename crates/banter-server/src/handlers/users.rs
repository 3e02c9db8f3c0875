//! User management endpoints.

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::models::{Role, UserOut};
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

/// Register a new user. Role may be set in the request body (default: user).
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserOut>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "name and password are required".into(),
        ));
    }
    if state.store.user_by_name(name).await?.is_some() {
        return Err(ApiError::BadRequest("Username already exists".into()));
    }

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;
    let role = req.role.unwrap_or(Role::User);
    let user = state.store.create_user(name, &password_hash, role).await?;

    info!(user = %user.name, role = %user.role, "user registered");
    Ok(Json(user.into()))
}

/// Login user.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserOut>, ApiError> {
    let user = state
        .store
        .user_by_name(req.name.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;

    if !bcrypt::verify(&req.password, &user.password)? {
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    info!(user = %user.name, "user logged in");
    Ok(Json(user.into()))
}

/// Get user by ID.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserOut>, ApiError> {
    let user = state
        .store
        .user_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

/// List all users.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserOut>>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserOut::from).collect()))
}
