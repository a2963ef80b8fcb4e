//! In-process store.
//!
//! A transaction takes an exclusive lock on the whole state and works on a
//! copy; `commit` swaps the copy in. Transactions are therefore fully
//! serialized, and dropping one discards its writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{
    AuthStore, AuthTx, CredentialStore, RefreshTokenStore, StoreError, StoreResult,
};
use crate::models::auth::{RefreshTokenRecord, User};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    /// Keyed by token hash.
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// Memory-backed [`AuthStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryAuthStore {
    state: Arc<Mutex<MemoryState>>,
    offline: Arc<AtomicBool>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, `begin` fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of a user by normalized email.
    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        let state = self.state.lock().await;
        state.users.values().find(|u| u.email == email).cloned()
    }

    /// Snapshot of every refresh token issued to `user_id`, oldest first.
    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        let state = self.state.lock().await;
        let mut tokens: Vec<_> = state
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.id);
        tokens
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn begin(&self) -> StoreResult<Box<dyn AuthTx>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryAuthTx { guard, working }))
    }
}

/// Open transaction on a [`MemoryAuthStore`].
pub struct MemoryAuthTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryAuthTx {
    fn user_mut(&mut self, user_id: Uuid) -> StoreResult<&mut User> {
        self.working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Backend(format!("user {user_id} does not exist")))
    }
}

#[async_trait]
impl CredentialStore for MemoryAuthTx {
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        if self.working.users.values().any(|u| u.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::now_v7(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        };
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn mark_inactive(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let user = self.user_mut(user_id)?;
        user.is_active = false;
        user.updated_at = now;
        Ok(())
    }

    async fn touch(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        self.user_mut(user_id)?.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryAuthTx {
    async fn create_refresh_token(
        &mut self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        if !self.working.users.contains_key(&user_id) {
            return Err(StoreError::Backend(format!("user {user_id} does not exist")));
        }
        if self.working.refresh_tokens.contains_key(token_hash) {
            return Err(StoreError::Backend("duplicate refresh token".into()));
        }
        let record = RefreshTokenRecord {
            id: Uuid::now_v7(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: now,
            revoked_at: None,
            is_revoked: false,
        };
        self.working
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<(RefreshTokenRecord, User)>> {
        let Some(record) = self.working.refresh_tokens.get(token_hash) else {
            return Ok(None);
        };
        let user = self
            .working
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or_else(|| StoreError::Backend("refresh token without owner".into()))?;
        Ok(Some((record.clone(), user)))
    }

    async fn find_active_refresh_tokens(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<RefreshTokenRecord>> {
        Ok(self
            .working
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.working.refresh_tokens.get_mut(token_hash) {
            Some(record) if !record.is_revoked => {
                record.is_revoked = true;
                record.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AuthTx for MemoryAuthTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryAuthTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
