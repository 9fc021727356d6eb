//! Auth Gate
//!
//! Request-level authentication. Public paths pass through; every other
//! request must carry a valid access token whose subject is an active user.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, Request};
use thiserror::Error;
use tracing::debug;

use crate::domain::Identity;
use crate::error::{PlatformError, Result};
use crate::service::token::{TokenError, TokenKind, TokenService};

/// Paths reachable without an access token.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/users/login", "/me", "/users/logout", "/health"];

/// Path prefixes reachable without an access token (API docs).
pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &["/swagger-ui", "/api-docs"];

/// Resolves a token subject to an active identity.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn find_active_subject(&self, id: u64) -> Result<Option<Identity>>;
}

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("Authorization token required!")]
    MissingToken,

    #[error("User session timeout.")]
    SessionTimeout,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("User not found.")]
    UserNotFound,

    #[error(transparent)]
    Lookup(#[from] PlatformError),
}

impl From<AuthFailure> for PlatformError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::SessionTimeout => PlatformError::SessionTimeout,
            AuthFailure::Lookup(e) => e,
            other => PlatformError::unauthorized(other.to_string()),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

pub struct AuthGate {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityLookup>,
    public_paths: Vec<String>,
    public_prefixes: Vec<String>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, identities: Arc<dyn IdentityLookup>) -> Self {
        Self {
            tokens,
            identities,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            public_prefixes: DEFAULT_PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = match path.len() {
            1 => path,
            _ => path.trim_end_matches('/'),
        };
        self.public_paths.iter().any(|p| p == path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// `Ok(None)` for public paths, the caller's identity otherwise.
    pub async fn authenticate<B>(&self, request: &Request<B>) -> std::result::Result<Option<Identity>, AuthFailure> {
        let path = request.uri().path();
        if self.is_public(path) {
            return Ok(None);
        }

        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or(AuthFailure::MissingToken)?;

        let claims = self
            .tokens
            .verify(token, TokenKind::Access)
            .map_err(|e| match e {
                TokenError::Expired => AuthFailure::SessionTimeout,
                TokenError::Invalid { .. } => AuthFailure::InvalidToken,
            })?;

        let identity = self
            .identities
            .find_active_subject(claims.subject_id)
            .await?
            .ok_or_else(|| {
                debug!(subject_id = claims.subject_id, path, "Token subject not found or inactive");
                AuthFailure::UserNotFound
            })?;

        Ok(Some(identity))
    }
}
