//! API server configuration.

use identity_core::config::{AuthConfig, ConfigError, database_url_from_lookup};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener.
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Token and credential settings.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                                   | Default        |
    /// |--------------------------------------------|----------------|
    /// | `BIND_ADDR`                                | `0.0.0.0:8080` |
    /// | `DB_CONNECTION_STRING` / `DATABASE_URL`    | required       |
    /// | `JWT_SECRET_KEY`                           | required       |
    ///
    /// Token, password and timeout settings are read by
    /// [`AuthConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth = AuthConfig::from_lookup(&lookup)?;
        let database_url = database_url_from_lookup(&lookup)?;
        let bind_addr = lookup("BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        Ok(Self {
            bind_addr,
            database_url,
            auth,
        })
    }
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
    fn reads_required_and_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("JWT_SECRET_KEY", "0123456789abcdef0123456789abcdef"),
            ("DB_CONNECTION_STRING", "postgres://localhost/identity"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, "postgres://localhost/identity");
        assert_eq!(config.auth.issuer, "IdentityService");
    }

    #[test]
    fn missing_database_is_fatal() {
        let err = ApiConfig::from_lookup(lookup(&[(
            "JWT_SECRET_KEY",
            "0123456789abcdef0123456789abcdef",
        )]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingDatabaseUrl);
    }
}
