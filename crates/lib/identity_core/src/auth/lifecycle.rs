//! Credential lifecycle — register / login / refresh / revoke / logout.
//!
//! Refresh tokens move `Active → Revoked` or `Active → Expired`; neither state
//! is ever left. Login collapses a user to one active refresh token by
//! revoking every other one, while refresh only rotates the token presented.
//! Each operation runs in a single store transaction bounded by the configured
//! store timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::AuthError;
use super::clock::{Clock, SystemClock};
use super::email::{normalize_email, validate_email};
use super::jwt::{ExpiryCheck, TokenIssuer, hash_refresh_token};
use super::password::{PasswordPolicy, hash_password, verify_password};
use super::store::{AuthStore, AuthTx, CredentialStore, RefreshTokenStore};
use crate::config::AuthConfig;
use crate::models::auth::{AuthResponse, TokenClaims, User};

/// Orchestrates the credential and token lifecycle over an [`AuthStore`].
pub struct CredentialService {
    store: Arc<dyn AuthStore>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
    policy: PasswordPolicy,
    bcrypt_cost: u32,
    refresh_token_ttl: chrono::Duration,
    store_timeout: Duration,
    /// Hash checked against when the email is unknown, so both login
    /// failures cost one bcrypt verification.
    dummy_hash: OnceCell<String>,
}

/// Password behind [`CredentialService::dummy_hash`]. Never matches a login
/// because no account is looked up for it.
const DUMMY_PASSWORD: &str = "identity-dummy-password";

impl CredentialService {
    /// Build a service on the wall clock.
    pub fn new(store: Arc<dyn AuthStore>, config: &AuthConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn AuthStore>,
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(config),
            clock,
            policy: config.password_policy.clone(),
            bcrypt_cost: config.bcrypt_cost,
            refresh_token_ttl: config.refresh_token_ttl,
            store_timeout: config.store_timeout,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    // -----------------------------------------------------------------------
    // Public lifecycle operations
    // -----------------------------------------------------------------------

    /// Create an account and its first session.
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;

        self.bounded("register", async {
            let mut tx = self.store.begin().await?;

            if tx.find_user_by_email(&email).await?.is_some() {
                return Err(AuthError::EmailTaken);
            }
            self.policy.check(password)?;

            let password_hash = self.hash(password).await?;
            let now = self.clock.now();
            let user = tx.create_user(&email, &password_hash, now).await?;

            let response = self.issue_tokens(&mut *tx, &user, now).await?;
            tx.commit().await?;

            info!(user_id = %user.id, email = %user.email, "user registered");
            Ok(response)
        })
        .await
    }

    /// Authenticate with email + password. Revokes every active refresh token
    /// the user holds before issuing a new pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);

        self.bounded("login", async {
            let mut tx = self.store.begin().await?;

            // Unknown email and wrong password are the same error.
            let Some(user) = tx.find_user_by_email(&email).await? else {
                let dummy = self.dummy_hash().await?;
                self.verify(password, dummy).await?;
                warn!(email = %email, "login failed: unknown email");
                return Err(AuthError::InvalidCredentials);
            };
            if !user.is_active {
                warn!(user_id = %user.id, "login refused: account inactive");
                return Err(AuthError::AccountInactive);
            }
            if !self.verify(password, &user.password_hash).await? {
                warn!(user_id = %user.id, "login failed: wrong password");
                return Err(AuthError::InvalidCredentials);
            }

            let now = self.clock.now();
            tx.touch(user.id, now).await?;

            let previous = tx.find_active_refresh_tokens(user.id, now).await?;
            for token in &previous {
                tx.revoke_refresh_token(&token.token_hash, now).await?;
            }

            let response = self.issue_tokens(&mut *tx, &user, now).await?;
            tx.commit().await?;

            info!(
                user_id = %user.id,
                revoked_sessions = previous.len(),
                "user logged in"
            );
            Ok(response)
        })
        .await
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked; replaying it afterwards fails with `InvalidToken`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::Validation("Refresh token is required".into()));
        }
        let token_hash = hash_refresh_token(refresh_token);

        self.bounded("refresh", async {
            let mut tx = self.store.begin().await?;
            let now = self.clock.now();

            // Revoked, expired and unknown tokens are the same error.
            let Some((record, user)) = tx.find_refresh_token(&token_hash).await? else {
                warn!("refresh failed: unknown token");
                return Err(AuthError::InvalidToken);
            };
            if !record.is_active_at(now) {
                warn!(
                    user_id = %record.user_id,
                    token_id = %record.id,
                    revoked = record.is_revoked,
                    "refresh failed: token no longer active"
                );
                return Err(AuthError::InvalidToken);
            }
            if !user.is_active {
                warn!(user_id = %user.id, "refresh refused: account inactive");
                return Err(AuthError::AccountInactive);
            }

            // Lost a race with a concurrent refresh of the same token.
            if !tx.revoke_refresh_token(&token_hash, now).await? {
                warn!(token_id = %record.id, "refresh failed: token already consumed");
                return Err(AuthError::InvalidToken);
            }

            let response = self.issue_tokens(&mut *tx, &user, now).await?;
            tx.commit().await?;

            info!(user_id = %user.id, rotated = %record.id, "refresh token rotated");
            Ok(response)
        })
        .await
    }

    /// Revoke a refresh token. Unknown or already inactive tokens succeed
    /// silently.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::Validation("Refresh token is required".into()));
        }
        let token_hash = hash_refresh_token(refresh_token);

        self.bounded("revoke", async {
            let mut tx = self.store.begin().await?;
            let now = self.clock.now();

            if let Some((record, _)) = tx.find_refresh_token(&token_hash).await?
                && record.is_active_at(now)
                && tx.revoke_refresh_token(&token_hash, now).await?
            {
                tx.commit().await?;
                info!(
                    user_id = %record.user_id,
                    token_id = %record.id,
                    "refresh token revoked"
                );
            }
            Ok(())
        })
        .await
    }

    /// Deactivate the account owning `email`.
    ///
    /// This is account-level: the user can no longer log in or refresh.
    /// Existing refresh tokens are left as they are.
    pub async fn logout(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        self.bounded("logout", async {
            let mut tx = self.store.begin().await?;

            let Some(user) = tx.find_user_by_email(&email).await? else {
                warn!(email = %email, "logout failed: user not found");
                return Err(AuthError::UserNotFound);
            };
            tx.mark_inactive(user.id, self.clock.now()).await?;
            tx.commit().await?;

            info!(user_id = %user.id, "user logged out, account deactivated");
            Ok(())
        })
        .await
    }

    /// Verify an access token against the current time.
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.issuer
            .verify_access_token(token, self.clock.now(), ExpiryCheck::Enforce)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Mint both tokens, then persist the refresh token inside `tx`.
    async fn issue_tokens(
        &self,
        tx: &mut dyn AuthTx,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse, AuthError> {
        let access = self.issuer.mint_access_token(user, now)?;
        let refresh_token = self.issuer.mint_refresh_token();
        let refresh_token_expires_at = now
            .checked_add_signed(self.refresh_token_ttl)
            .ok_or_else(|| AuthError::Internal("refresh token expiry out of range".into()))?;

        tx.create_refresh_token(
            user.id,
            &hash_refresh_token(&refresh_token),
            refresh_token_expires_at,
            now,
        )
        .await?;

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token,
            email: user.email.clone(),
            user_id: user.id,
            access_token_expires_at: access.expires_at,
            refresh_token_expires_at,
        })
    }

    /// Run `op` under the store timeout. On expiry the future is dropped,
    /// which rolls back its open transaction.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.store_timeout, "store operation timed out");
                Err(AuthError::Transient(format!(
                    "{op} timed out after {:?}",
                    self.store_timeout
                )))
            }
        }
    }

    /// bcrypt is CPU-bound; keep it off the async workers.
    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
    }

    /// Hashed at the configured cost on first use.
    async fn dummy_hash(&self) -> Result<&str, AuthError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD))
            .await
            .map(String::as_str)
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verify task: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuthStore;

    fn service() -> CredentialService {
        let mut config = AuthConfig::with_signing_key("lifecycle-unit-test-key-lifecycle-unit");
        config.bcrypt_cost = 4;
        CredentialService::new(Arc::new(MemoryAuthStore::new()), &config)
    }

    #[tokio::test]
    async fn unknown_email_still_runs_a_password_check() {
        let service = service();
        assert!(!service.dummy_hash.initialized());

        assert!(matches!(
            service.login("nobody@example.com", "password123").await,
            Err(AuthError::InvalidCredentials)
        ));
        let dummy = service.dummy_hash.get().unwrap();
        assert!(dummy.starts_with("$2"));
        assert!(!verify_password("password123", dummy).unwrap());
    }

    #[tokio::test]
    async fn dummy_password_cannot_log_in() {
        let service = service();
        assert!(matches!(
            service.login("nobody@example.com", DUMMY_PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
