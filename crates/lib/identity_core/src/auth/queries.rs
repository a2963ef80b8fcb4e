//! PostgreSQL store: auth-related database queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{
    AuthStore, AuthTx, CredentialStore, RefreshTokenStore, StoreError, StoreResult,
};
use crate::models::auth::{RefreshTokenRecord, User};

type UserRow = (Uuid, String, String, DateTime<Utc>, DateTime<Utc>, bool);

type RefreshTokenRow = (
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    bool,
);

fn user_from_row((id, email, password_hash, created_at, updated_at, is_active): UserRow) -> User {
    User {
        id,
        email,
        password_hash,
        created_at,
        updated_at,
        is_active,
    }
}

fn refresh_token_from_row(
    (id, user_id, token_hash, expires_at, created_at, revoked_at, is_revoked): RefreshTokenRow,
) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id,
        user_id,
        token_hash,
        expires_at,
        created_at,
        revoked_at,
        is_revoked,
    }
}

/// SQLSTATEs for a transaction that lost a concurrency conflict:
/// `serialization_failure` and `deadlock_detected`.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

fn is_retryable_sqlstate(code: &str) -> bool {
    RETRYABLE_SQLSTATES.contains(&code)
}

/// Classify a sqlx error. Connectivity problems and aborted concurrent
/// transactions are retryable; everything else is a backend fault.
fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Database(ref db) if db.code().is_some_and(|c| is_retryable_sqlstate(&c)) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

/// [`AuthStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn begin(&self) -> StoreResult<Box<dyn AuthTx>> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(PgAuthTx { tx }))
    }
}

/// Open PostgreSQL transaction. Rolled back on drop unless committed.
pub struct PgAuthTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CredentialStore for PgAuthTx {
    /// Locks the user row until the transaction ends.
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, updated_at, is_active \
             FROM auth.users WHERE email = $1 \
             FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(row.map(user_from_row))
    }

    async fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO auth.users (id, email, password_hash, created_at, updated_at, is_active) \
             VALUES ($1, $2, $3, $4, $4, TRUE) \
             RETURNING id, email, password_hash, created_at, updated_at, is_active",
        )
        .bind(Uuid::now_v7())
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e
                && db.is_unique_violation()
            {
                return StoreError::DuplicateEmail;
            }
            store_error(e)
        })?;
        Ok(user_from_row(row))
    }

    async fn mark_inactive(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE auth.users SET is_active = FALSE, updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn touch(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE auth.users SET updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgAuthTx {
    async fn create_refresh_token(
        &mut self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "INSERT INTO auth.refresh_tokens (id, user_id, token_hash, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, token_hash, expires_at, created_at, revoked_at, is_revoked",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(refresh_token_from_row(row))
    }

    /// Locks the owning user row, then the token row, until the transaction
    /// ends. Every operation that touches both locks the user first; inserting
    /// a token also takes a key-share lock on its user, so any other order
    /// deadlocks against a concurrent login.
    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<(RefreshTokenRecord, User)>> {
        // Unlocked read: only used to find which user to lock.
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM auth.refresh_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?;
        let Some(user_id) = owner else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, updated_at, is_active \
             FROM auth.users WHERE id = $1 \
             FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        let Some(user) = user else {
            return Ok(None);
        };

        let record = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id, user_id, token_hash, expires_at, created_at, revoked_at, is_revoked \
             FROM auth.refresh_tokens WHERE token_hash = $1 \
             FOR UPDATE",
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;

        Ok(record.map(|row| (refresh_token_from_row(row), user_from_row(user))))
    }

    async fn find_active_refresh_tokens(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<RefreshTokenRecord>> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id, user_id, token_hash, expires_at, created_at, revoked_at, is_revoked \
             FROM auth.refresh_tokens \
             WHERE user_id = $1 \
               AND is_revoked = FALSE \
               AND expires_at > $2 \
             ORDER BY created_at \
             FOR UPDATE",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(refresh_token_from_row).collect())
    }

    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE auth.refresh_tokens SET is_revoked = TRUE, revoked_at = $2 \
             WHERE token_hash = $1 AND is_revoked = FALSE",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AuthTx for PgAuthTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(store_error)
    }
}
