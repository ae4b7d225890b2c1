//! Access and refresh tokens (HS256 JWTs).
//!
//! Expiry is checked by `jsonwebtoken` against system time, so `iat`/`exp`
//! are stamped from system time as well rather than from the offset clock.

use std::time::Duration;

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, get_current_timestamp, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::session::generate_token_id;
use crate::config::Config;

/// Claims of a refresh token. One refresh token backs one session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User id, as a string per RFC 7519.
    pub sub: String,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub session_id: i64,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies both token kinds.
#[derive(Clone)]
pub struct TokenService {
    access: Keys,
    refresh: Keys,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: Keys::new(access_secret),
            refresh: Keys::new(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    /// Create a refresh token for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue_refresh_token(&self, user_id: i64) -> Result<String> {
        let iat = get_current_timestamp();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: generate_token_id(),
            iat,
            exp: iat + self.refresh_ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.refresh.encoding)
            .context("Failed to encode refresh token")
    }

    /// Create an access token bound to a session.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue_access_token(&self, session_id: i64) -> Result<String> {
        let iat = get_current_timestamp();
        let claims = AccessClaims {
            session_id,
            iat,
            exp: iat + self.access_ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.access.encoding)
            .context("Failed to encode access token")
    }

    /// Verify signature and expiry of a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, forged or expired.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh.decoding, &validation())
            .map(|data| data.claims)
            .context("Invalid refresh token")
    }

    /// Verify signature and expiry of an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, forged or expired.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.access.decoding, &validation())
            .map(|data| data.claims)
            .context("Invalid access token")
    }
}

fn validation() -> Validation {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}
