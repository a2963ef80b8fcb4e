//! Password hashing via bcrypt, plus the strength policy applied at registration.

use super::AuthError;

/// Minimum password length when nothing else is configured.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password with bcrypt at the given cost. Salted internally.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Password strength gate. Minimum length always applies; the character-class
/// requirements are opt-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    pub require_digit: bool,
    pub require_letter: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            require_digit: false,
            require_letter: false,
        }
    }
}

impl PasswordPolicy {
    /// Returns `AuthError::WeakPassword` describing the first unmet rule.
    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at least {} characters",
                self.min_length
            )));
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::WeakPassword(
                "Password must contain a digit".into(),
            ));
        }
        if self.require_letter && !password.chars().any(char::is_alphabetic) {
            return Err(AuthError::WeakPassword(
                "Password must contain a letter".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts; keeps tests fast.
    const TEST_COST: u32 = 4;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("password123", TEST_COST).unwrap();
        assert_ne!(hash, "password123");
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("password123", TEST_COST).unwrap();
        let b = hash_password("password123", TEST_COST).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(matches!(
            verify_password("password123", "not-a-hash"),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn default_policy_is_a_length_gate() {
        let policy = PasswordPolicy::default();
        assert!(matches!(
            policy.check("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(policy.check("12345678").is_ok());
        assert!(policy.check("abcdefgh").is_ok());
    }

    #[test]
    fn optional_character_classes() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_digit: true,
            require_letter: true,
        };
        assert!(policy.check("abcdefgh").is_err());
        assert!(policy.check("12345678").is_err());
        assert!(policy.check("abcd1234").is_ok());
    }

    #[test]
    fn passwords_bcrypt_would_truncate_are_rejected() {
        let policy = PasswordPolicy::default();
        assert!(policy.check(&"a".repeat(MAX_PASSWORD_BYTES)).is_ok());
        assert!(matches!(
            policy.check(&"a".repeat(MAX_PASSWORD_BYTES + 1)),
            Err(AuthError::WeakPassword(_))
        ));
        // 25 three-byte characters: 25 chars, 75 bytes.
        assert!(policy.check(&"€".repeat(25)).is_err());
    }
}
