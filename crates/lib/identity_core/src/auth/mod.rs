//! Authentication and token lifecycle.
//!
//! Password hashing, access-token signing, refresh-token storage and the
//! [`lifecycle::CredentialService`] that ties them together.

pub mod clock;
pub mod email;
pub mod jwt;
pub mod lifecycle;
pub mod memory;
pub mod password;
pub mod queries;
pub mod store;

use thiserror::Error;

use self::store::StoreError;

/// Authentication errors.
///
/// `InvalidCredentials`, `InvalidToken` and `AccountInactive` are kept apart
/// here for logging; the HTTP layer collapses them per endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("User not found")]
    UserNotFound,

    #[error("Store temporarily unavailable: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::EmailTaken,
            StoreError::Unavailable(msg) => AuthError::Transient(msg),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert!(matches!(
            AuthError::from(StoreError::DuplicateEmail),
            AuthError::EmailTaken
        ));
        assert!(matches!(
            AuthError::from(StoreError::Unavailable("pool timed out".into())),
            AuthError::Transient(_)
        ));
        assert!(matches!(
            AuthError::from(StoreError::Backend("syntax error".into())),
            AuthError::Internal(_)
        ));
    }
}
