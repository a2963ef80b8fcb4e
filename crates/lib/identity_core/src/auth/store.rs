//! Store contracts for users and refresh tokens.
//!
//! Every lifecycle operation runs inside one [`AuthTx`]: reads and the writes
//! that depend on them commit together or not at all. Dropping a transaction
//! without calling [`AuthTx::commit`] rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{RefreshTokenRecord, User};

/// Store-level failures. Backend error types never cross this boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    /// Connection, pool or I/O failure; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Users, keyed by id and by normalized email.
#[async_trait]
pub trait CredentialStore: Send {
    /// Look up a user by normalized email. Implementations may lock the row
    /// for the remainder of the transaction.
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;

    /// Insert a new active user. Fails with [`StoreError::DuplicateEmail`] if
    /// the normalized email is already present.
    async fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    /// Set `is_active = false` and bump `updated_at`.
    async fn mark_inactive(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;

    /// Bump `updated_at`.
    async fn touch(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
}

/// Refresh tokens, keyed by token hash and by owning user.
#[async_trait]
pub trait RefreshTokenStore: Send {
    async fn create_refresh_token(
        &mut self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord>;

    /// Look up a token together with its owning user, whatever its state.
    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<(RefreshTokenRecord, User)>>;

    /// Tokens for `user_id` that are neither revoked nor expired at `now`.
    async fn find_active_refresh_tokens(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<RefreshTokenRecord>>;

    /// Mark a token revoked at `now`. Idempotent: returns `true` only if this
    /// call flipped it from unrevoked to revoked.
    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// One open transaction spanning both stores.
#[async_trait]
pub trait AuthTx: CredentialStore + RefreshTokenStore {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Opens transactions.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn AuthTx>>;
}
