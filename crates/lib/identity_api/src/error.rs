//! Application error types.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use identity_core::auth::AuthError;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Login failures share one message so callers cannot tell which accounts exist.
pub const LOGIN_FAILED: &str = "Invalid email or password";

/// Refresh failures share one message.
pub const REFRESH_FAILED: &str = "Invalid or expired refresh token";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Map a login failure. Unknown email, wrong password and inactive
    /// account all read the same on the wire.
    pub fn login(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::AccountInactive => {
                AppError::Unauthorized(LOGIN_FAILED.into())
            }
            other => other.into(),
        }
    }

    /// Map a refresh failure. Unknown, revoked and expired tokens, and
    /// tokens of inactive accounts, all read the same on the wire.
    pub fn refresh(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken | AuthError::AccountInactive => {
                AppError::Unauthorized(REFRESH_FAILED.into())
            }
            other => other.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unavailable(detail) => {
                warn!(detail = %detail, "request failed: store unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "temporarily_unavailable",
                    "Service temporarily unavailable, retry later",
                )
            }
            AppError::Internal(detail) => {
                error!(detail = %detail, "request failed: internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(msg) | AuthError::WeakPassword(msg) => AppError::Validation(msg),
            AuthError::EmailTaken => AppError::Conflict("Email already registered".into()),
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::AccountInactive => {
                AppError::Unauthorized(e.to_string())
            }
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::Transient(msg) => AppError::Unavailable(msg),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}
