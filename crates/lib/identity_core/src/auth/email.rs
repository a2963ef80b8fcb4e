//! Email normalization and format checks.

use super::AuthError;

/// Longest accepted address (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Normalize an email for storage and lookup: trimmed and lower-cased.
///
/// The store only ever holds this form, so comparisons are exact.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Reject obviously malformed addresses.
///
/// Expects an already-normalized email.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".into()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(AuthError::Validation("Email is too long".into()));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid_format());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid_format());
    };
    if local.is_empty() || domain.contains('@') {
        return Err(invalid_format());
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid_format());
    }
    Ok(())
}

fn invalid_format() -> AuthError {
    AuthError::Validation("Invalid email format".into())
}
