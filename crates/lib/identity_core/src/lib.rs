//! # identity_core
//!
//! Credential and token lifecycle engine: password verification, access-token
//! minting, refresh-token issuance / rotation / revocation.

pub mod auth;
pub mod config;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
