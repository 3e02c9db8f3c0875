//! HTTP API error type and its response envelope.
//!
//! Every handler failure is rendered as `{"error": <code>, "detail": <text>}`
//! with a matching status code, so clients can branch on a stable shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use banter_core::StoreError;
use thiserror::Error;
use tracing::error;

/// An HTTP API failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400: the request conflicts with existing state or is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// 401: credentials did not verify.
    #[error("{0}")]
    Unauthorized(String),

    /// 403: the caller lacks permission.
    #[error("{0}")]
    Forbidden(String),

    /// 404: a referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// 500: an unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Internal(_) => "internal_server_error",
            _ => "http_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!(detail = %detail, "internal server error");
        }
        let body = Json(serde_json::json!({
            "error": self.code(),
            "detail": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(e: bcrypt::BcryptError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
