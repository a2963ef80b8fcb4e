//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP DTOs in
//! `identity_api` (which carry `#[serde(rename_all = "camelCase")]`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record. `email` is always stored in normalized (lower-cased) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Refresh token record stored in the database.
///
/// Only the SHA-256 digest of the opaque token string is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
}

impl RefreshTokenRecord {
    /// `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Neither revoked nor expired at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — user ID (standard JWT `sub` claim).
    pub sub: String,
    /// User email.
    pub email: String,
    /// Unique token ID, for audit correlation.
    pub jti: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Result of a successful register / login / refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
    pub user_id: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(expires_at: DateTime<Utc>, is_revoked: bool) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            token_hash: "abc".into(),
            expires_at,
            created_at: now,
            revoked_at: is_revoked.then_some(now),
            is_revoked,
        }
    }

    #[test]
    fn token_is_expired_exactly_at_expiry() {
        let now = Utc::now();
        let rt = record(now, false);
        assert!(rt.is_expired_at(now));
        assert!(!rt.is_active_at(now));
        assert!(rt.is_active_at(now - Duration::seconds(1)));
    }

    #[test]
    fn revoked_token_is_never_active() {
        let now = Utc::now();
        let rt = record(now + Duration::days(7), true);
        assert!(!rt.is_expired_at(now));
        assert!(!rt.is_active_at(now));
    }
}
