//! Authentication request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AuthResult, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest};

/// `POST /api/auth/register` — create an account and its first session.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AuthResult>)> {
    let Json(body) = body?;
    let resp = state.service.register(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(resp.into())))
}

/// `POST /api/auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResult>> {
    let Json(body) = body?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }
    let resp = state
        .service
        .login(&body.email, &body.password)
        .await
        .map_err(AppError::login)?;
    Ok(Json(resp.into()))
}

/// `POST /api/auth/refresh` — exchange a refresh token for a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Json<AuthResult>> {
    let Json(body) = body?;
    let resp = state
        .service
        .refresh(&body.refresh_token)
        .await
        .map_err(AppError::refresh)?;
    Ok(Json(resp.into()))
}

/// `POST /api/auth/revoke` — revoke a refresh token. Always succeeds for
/// well-formed input, whether or not the token was live.
pub async fn revoke_handler(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(body) = body?;
    state.service.revoke(&body.refresh_token).await?;
    Ok(Json(MessageResponse {
        message: "Token revoked".into(),
    }))
}

/// `POST /api/auth/logout` — deactivate the caller's account. Requires
/// authentication.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<MessageResponse>> {
    state.service.logout(&claims.email).await?;
    Ok(Json(MessageResponse {
        message: "Logged out".into(),
    }))
}
