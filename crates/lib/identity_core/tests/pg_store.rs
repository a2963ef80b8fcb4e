//! PostgreSQL store tests. Run only when `TEST_DATABASE_URL` points at a
//! scratch database; otherwise each test returns early.

use std::sync::Arc;

use chrono::{Duration, Utc};
use identity_core::auth::AuthError;
use identity_core::auth::lifecycle::CredentialService;
use identity_core::auth::queries::PgAuthStore;
use identity_core::auth::store::{
    AuthStore, AuthTx, CredentialStore, RefreshTokenStore, StoreError,
};
use identity_core::config::AuthConfig;
use sqlx::PgPool;
use uuid::Uuid;

async fn connect() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.expect("connect to TEST_DATABASE_URL");
    identity_core::migrate::migrate(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4())
}

#[tokio::test]
async fn duplicate_email_maps_to_store_error() {
    let Some(pool) = connect().await else {
        return;
    };
    let store = PgAuthStore::new(pool);
    let email = unique_email();
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.create_user(&email, "hash", now).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(matches!(
        tx.create_user(&email, "hash", now).await,
        Err(StoreError::DuplicateEmail)
    ));
}

#[tokio::test]
async fn refresh_token_round_trip_with_owner() {
    let Some(pool) = connect().await else {
        return;
    };
    let store = PgAuthStore::new(pool);
    let email = unique_email();
    let now = Utc::now();
    let hash = format!("hash-{}", Uuid::new_v4());

    let mut tx = store.begin().await.unwrap();
    let user = tx.create_user(&email, "pw", now).await.unwrap();
    tx.create_refresh_token(user.id, &hash, now + Duration::days(7), now)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let (record, owner) = tx.find_refresh_token(&hash).await.unwrap().unwrap();
    assert_eq!(owner.id, user.id);
    assert_eq!(owner.email, email);
    assert!(!record.is_revoked);
    assert_eq!(
        tx.find_active_refresh_tokens(user.id, now).await.unwrap().len(),
        1
    );
    assert!(tx.revoke_refresh_token(&hash, now).await.unwrap());
    assert!(!tx.revoke_refresh_token(&hash, now).await.unwrap());
    assert!(
        tx.find_active_refresh_tokens(user.id, now)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn concurrent_refresh_issues_one_descendant() {
    let Some(pool) = connect().await else {
        return;
    };
    let mut config = AuthConfig::with_signing_key("pg-test-signing-key-pg-test-signing");
    config.bcrypt_cost = 4;
    let service = Arc::new(CredentialService::new(
        Arc::new(PgAuthStore::new(pool)),
        &config,
    ));
    let registered = service
        .register(&unique_email(), "password123")
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let token = registered.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(AuthError::InvalidToken) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn concurrent_login_and_refresh_do_not_deadlock() {
    let Some(pool) = connect().await else {
        return;
    };
    let mut config = AuthConfig::with_signing_key("pg-test-signing-key-pg-test-signing");
    config.bcrypt_cost = 4;
    let store = PgAuthStore::new(pool);
    let service = Arc::new(CredentialService::new(Arc::new(store.clone()), &config));

    for _ in 0..20 {
        let email = unique_email();
        let registered = service.register(&email, "password123").await.unwrap();

        let (login, refresh) = tokio::join!(
            service.login(&email, "password123"),
            service.refresh(&registered.refresh_token)
        );

        login.unwrap();
        match refresh {
            Ok(_) | Err(AuthError::InvalidToken) => {}
            Err(e) => panic!("refresh lost the race with an unexpected error: {e}"),
        }

        // Whichever side committed last, one session survives.
        let mut tx = store.begin().await.unwrap();
        let active = tx
            .find_active_refresh_tokens(registered.user_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }
}
