//! Startup configuration.
//!
//! Read once from the environment, then passed around by value. Nothing in
//! this crate reads the environment after startup.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::auth::password::PasswordPolicy;

/// Default `iss` / `aud` claim value.
pub const DEFAULT_ISSUER: &str = "IdentityService";

/// Access token lifetime default: 15 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// Refresh token lifetime default: 7 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// bcrypt cost factor default.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Upper bound on one lifecycle transaction.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Longest accepted access or refresh token lifetime (ten years).
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// bcrypt's accepted cost range.
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Signing keys shorter than this are accepted with a warning.
const RECOMMENDED_KEY_LEN: usize = 32;

/// Fatal configuration errors. Any of these prevents the service from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET_KEY is not set")]
    MissingSigningKey,

    #[error("DB_CONNECTION_STRING is not set")]
    MissingDatabaseUrl,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Token and credential settings shared by the issuer and lifecycle service.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC signing key for access tokens.
    pub signing_key: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub password_policy: PasswordPolicy,
    pub bcrypt_cost: u32,
    /// Bound on a single register / login / refresh / revoke / logout.
    pub store_timeout: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("password_policy", &self.password_policy)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl AuthConfig {
    /// Settings with defaults for everything but the signing key.
    pub fn with_signing_key(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_ISSUER.to_string(),
            access_token_ttl: chrono::Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
            refresh_token_ttl: chrono::Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            password_policy: PasswordPolicy::default(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                               | Default           |
    /// |----------------------------------------|-------------------|
    /// | `JWT_SECRET_KEY`                       | required          |
    /// | `JWT_ISSUER`                           | `IdentityService` |
    /// | `JWT_AUDIENCE`                         | `IdentityService` |
    /// | `JWT_ACCESS_TOKEN_EXPIRATION_MINUTES`  | `15`              |
    /// | `JWT_REFRESH_TOKEN_EXPIRATION_DAYS`    | `7`               |
    /// | `PASSWORD_MIN_LENGTH`                  | `8`               |
    /// | `PASSWORD_REQUIRE_DIGIT`               | `false`           |
    /// | `PASSWORD_REQUIRE_LETTER`              | `false`           |
    /// | `BCRYPT_COST`                          | `12`              |
    /// | `STORE_TIMEOUT_SECS`                   | `10`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_key =
            non_empty(&lookup, "JWT_SECRET_KEY").ok_or(ConfigError::MissingSigningKey)?;
        if signing_key.len() < RECOMMENDED_KEY_LEN {
            warn!(
                len = signing_key.len(),
                recommended = RECOMMENDED_KEY_LEN,
                "JWT signing key is shorter than recommended"
            );
        }

        let mut config = Self::with_signing_key(signing_key.into_bytes());

        if let Some(issuer) = non_empty(&lookup, "JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Some(audience) = non_empty(&lookup, "JWT_AUDIENCE") {
            config.audience = audience;
        }

        let access_minutes: i64 = parse_positive(
            &lookup,
            "JWT_ACCESS_TOKEN_EXPIRATION_MINUTES",
            DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
        )?;
        config.access_token_ttl = bounded_ttl(
            "JWT_ACCESS_TOKEN_EXPIRATION_MINUTES",
            access_minutes,
            chrono::Duration::try_minutes(access_minutes),
        )?;

        let refresh_days: i64 = parse_positive(
            &lookup,
            "JWT_REFRESH_TOKEN_EXPIRATION_DAYS",
            DEFAULT_REFRESH_TOKEN_TTL_DAYS,
        )?;
        config.refresh_token_ttl = bounded_ttl(
            "JWT_REFRESH_TOKEN_EXPIRATION_DAYS",
            refresh_days,
            chrono::Duration::try_days(refresh_days),
        )?;

        config.password_policy = PasswordPolicy {
            min_length: parse_positive(
                &lookup,
                "PASSWORD_MIN_LENGTH",
                config.password_policy.min_length,
            )?,
            require_digit: parse_or(&lookup, "PASSWORD_REQUIRE_DIGIT", false)?,
            require_letter: parse_or(&lookup, "PASSWORD_REQUIRE_LETTER", false)?,
        };

        let cost: u32 = parse_or(&lookup, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: cost.to_string(),
            });
        }
        config.bcrypt_cost = cost;

        let timeout_secs: u64 =
            parse_positive(&lookup, "STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS)?;
        config.store_timeout = Duration::from_secs(timeout_secs);

        Ok(config)
    }
}

/// Resolve the database connection string: `DB_CONNECTION_STRING` → `DATABASE_URL`.
pub fn database_url_from_lookup<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(&lookup, "DB_CONNECTION_STRING")
        .or_else(|| non_empty(&lookup, "DATABASE_URL"))
        .ok_or(ConfigError::MissingDatabaseUrl)
}

/// Reject lifetimes chrono cannot represent or longer than [`MAX_TOKEN_TTL_DAYS`].
fn bounded_ttl(
    key: &'static str,
    raw: i64,
    ttl: Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    ttl.filter(|ttl| ttl.num_days() <= MAX_TOKEN_TTL_DAYS)
        .ok_or(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        })
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + ToString,
{
    let value = parse_or(lookup, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_signing_key_is_fatal() {
        let err = AuthConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingSigningKey);

        let err = AuthConfig::from_lookup(lookup(&[("JWT_SECRET_KEY", "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingSigningKey);
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config =
            AuthConfig::from_lookup(lookup(&[("JWT_SECRET_KEY", "k".repeat(40).as_str())]))
                .unwrap();
        assert_eq!(config.issuer, "IdentityService");
        assert_eq!(config.audience, "IdentityService");
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(15));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(7));
        assert_eq!(config.password_policy.min_length, 8);
        assert!(!config.password_policy.require_digit);
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_ISSUER", "issuer-x"),
            ("JWT_AUDIENCE", "aud-y"),
            ("JWT_ACCESS_TOKEN_EXPIRATION_MINUTES", "5"),
            ("JWT_REFRESH_TOKEN_EXPIRATION_DAYS", "30"),
            ("PASSWORD_MIN_LENGTH", "12"),
            ("PASSWORD_REQUIRE_DIGIT", "true"),
            ("BCRYPT_COST", "4"),
        ]))
        .unwrap();
        assert_eq!(config.issuer, "issuer-x");
        assert_eq!(config.audience, "aud-y");
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(5));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(30));
        assert_eq!(config.password_policy.min_length, 12);
        assert!(config.password_policy.require_digit);
        assert_eq!(config.bcrypt_cost, 4);
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_ACCESS_TOKEN_EXPIRATION_MINUTES", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "JWT_ACCESS_TOKEN_EXPIRATION_MINUTES",
                ..
            }
        ));

        let err = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_REFRESH_TOKEN_EXPIRATION_DAYS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("BCRYPT_COST", "2"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BCRYPT_COST", .. }));
    }

    #[test]
    fn out_of_range_lifetimes_are_rejected() {
        let err = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_ACCESS_TOKEN_EXPIRATION_MINUTES", "999999999999999999"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "JWT_ACCESS_TOKEN_EXPIRATION_MINUTES",
                ..
            }
        ));

        // Representable, but far past the cap.
        let err = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_REFRESH_TOKEN_EXPIRATION_DAYS", "100000000"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "JWT_REFRESH_TOKEN_EXPIRATION_DAYS",
                ..
            }
        ));

        let config = AuthConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_REFRESH_TOKEN_EXPIRATION_DAYS", "3650"),
        ]))
        .unwrap();
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(MAX_TOKEN_TTL_DAYS));
    }

    #[test]
    fn database_url_prefers_connection_string() {
        assert_eq!(
            database_url_from_lookup(lookup(&[])),
            Err(ConfigError::MissingDatabaseUrl)
        );
        assert_eq!(
            database_url_from_lookup(lookup(&[("DATABASE_URL", "postgres://b")])).unwrap(),
            "postgres://b"
        );
        assert_eq!(
            database_url_from_lookup(lookup(&[
                ("DB_CONNECTION_STRING", "postgres://a"),
                ("DATABASE_URL", "postgres://b"),
            ]))
            .unwrap(),
            "postgres://a"
        );
    }
}
