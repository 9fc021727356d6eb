//! Token Service
//!
//! Issues and verifies the two session tokens:
//! - access tokens (12h), sent as `Authorization: Bearer <token>`
//! - refresh tokens (24h), signed with a separate secret and carried in the
//!   `refreshToken` cookie
//!
//! Verification is stateless. Expiry is checked against the injected clock
//! rather than by the JWT library, so tests can move time forward.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::service::clock::Clock;

pub const ACCESS_TOKEN_TTL_HOURS: i64 = 12;
pub const REFRESH_TOKEN_TTL_HOURS: i64 = 24;

/// Signed payload of both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user) id
    #[serde(rename = "id")]
    pub subject_id: u64,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {message}")]
    Invalid { message: String },
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(access_secret: &str, refresh_secret: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(PlatformError::Configuration {
                message: "JWT_SECRET and REFRESH_JWT_SECRET must not be empty".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `verify`
        validation.validate_exp = false;

        Ok(Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            validation,
            clock,
        })
    }

    pub fn issue_access(&self, subject_id: u64) -> Result<String> {
        self.issue(subject_id, TokenKind::Access)
    }

    pub fn issue_refresh(&self, subject_id: u64) -> Result<String> {
        self.issue(subject_id, TokenKind::Refresh)
    }

    /// Lifetime of a token kind in seconds.
    pub fn ttl_seconds(kind: TokenKind) -> i64 {
        Self::ttl(kind).num_seconds()
    }

    fn ttl(kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::hours(ACCESS_TOKEN_TTL_HOURS),
            TokenKind::Refresh => Duration::hours(REFRESH_TOKEN_TTL_HOURS),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(&self, subject_id: u64, kind: TokenKind) -> Result<String> {
        let now = self.clock.now();
        let claims = TokenClaims {
            subject_id,
            iat: now.timestamp(),
            exp: (now + Self::ttl(kind)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| PlatformError::internal(format!("Failed to sign token: {}", e)))
    }

    /// Check signature and structure, then expiry (`now >= exp` is expired).
    pub fn verify(&self, token: &str, kind: TokenKind) -> std::result::Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, ?kind, "Token rejected");
                TokenError::Invalid { message: e.to_string() }
            })?;

        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}
