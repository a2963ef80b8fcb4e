//! Token issuance: signed JWT access tokens and opaque refresh tokens.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rng};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use crate::config::AuthConfig;
use crate::models::auth::{TokenClaims, User};

/// Only algorithm accepted on verification.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Raw entropy in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 64;

/// Whether verification enforces `exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    Enforce,
    /// Signature, algorithm, issuer and audience are still checked.
    AllowExpired,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub claims: TokenClaims,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies tokens. Holds the signing key, issuer, audience and
/// access token TTL; constructed once at startup and never mutated.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&config.signing_key),
            decoding_key: DecodingKey::from_secret(&config.signing_key),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: config.access_token_ttl,
        }
    }

    /// Generate a signed JWT access token (HS256) for `user`, valid from `now`
    /// for the configured TTL. Each token carries a fresh random `jti`.
    ///
    /// `exp` has whole-second resolution, so `expires_at` is truncated to the
    /// second to match what verification enforces.
    pub fn mint_access_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, AuthError> {
        let expires_at = now
            .trunc_subsecs(0)
            .checked_add_signed(self.access_token_ttl)
            .ok_or_else(|| AuthError::Internal("access token expiry out of range".into()))?;
        let claims = TokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok(AccessToken {
            token,
            claims,
            expires_at,
        })
    }

    /// Verify an access token at `now`, returning its claims.
    ///
    /// Rejects anything not signed with HS256 under our key, or carrying a
    /// different issuer or audience. With [`ExpiryCheck::Enforce`] a token is
    /// expired once `now >= exp` (no leeway).
    pub fn verify_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        expiry: ExpiryCheck,
    ) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;
        // Expiry is checked below against the caller's clock.
        validation.validate_exp = false;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidAlgorithm => {
                        debug!("rejected token with unexpected algorithm")
                    }
                    kind => debug!(?kind, "rejected access token"),
                }
                AuthError::InvalidToken
            })?
            .claims;

        if expiry == ExpiryCheck::Enforce && now.timestamp() >= claims.exp {
            debug!(jti = %claims.jti, "rejected expired access token");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Generate an opaque refresh token: 64 random bytes, base64-encoded.
    pub fn mint_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rng().fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }
}

/// SHA-256 hash a refresh token for storage and lookup.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
