//! Request and response bodies. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `/refresh` and `/revoke`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair returned by register, login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
    pub user_id: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl From<identity_core::models::auth::AuthResponse> for AuthResult {
    fn from(r: identity_core::models::auth::AuthResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            email: r.email,
            user_id: r.user_id,
            access_token_expires_at: r.access_token_expires_at,
            refresh_token_expires_at: r.refresh_token_expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_request_reads_camel_case() {
        let req: RefreshRequest = serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(req.refresh_token, "abc");
        assert!(serde_json::from_str::<RefreshRequest>(r#"{"refresh_token":"abc"}"#).is_err());
    }

    #[test]
    fn auth_result_writes_camel_case() {
        let now = Utc::now();
        let body = AuthResult {
            access_token: "a".into(),
            refresh_token: "r".into(),
            email: "alice@example.com".into(),
            user_id: Uuid::nil(),
            access_token_expires_at: now,
            refresh_token_expires_at: now,
        };
        let json = serde_json::to_value(&body).unwrap();
        for key in [
            "accessToken",
            "refreshToken",
            "email",
            "userId",
            "accessTokenExpiresAt",
            "refreshTokenExpiresAt",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
