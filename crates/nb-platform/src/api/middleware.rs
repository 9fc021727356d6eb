//! API Middleware
//!
//! Per-request transaction scope, the Auth Gate, and the extractor handlers
//! use to read the authenticated identity.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::domain::Identity;
use crate::error::PlatformError;
use crate::persistence::TransactionContext;
use crate::service::AuthGate;

/// Give every request its own transaction binding.
pub async fn transaction_scope(request: Request, next: Next) -> Response {
    TransactionContext::scope(next.run(request)).await
}

/// Authenticate the request and attach the caller's identity.
pub async fn authenticate(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> Response {
    // The body is not Sync, so authenticate against the head only
    let (parts, body) = request.into_parts();
    let head = Request::from_parts(parts, ());
    let outcome = gate.authenticate(&head).await;
    let (mut parts, ()) = head.into_parts();

    match outcome {
        Ok(Some(identity)) => {
            parts.extensions.insert(identity);
        }
        Ok(None) => {}
        Err(failure) => {
            debug!(path = %parts.uri.path(), reason = %failure, "Request rejected by auth gate");
            return PlatformError::from(failure).into_response();
        }
    }

    next.run(Request::from_parts(parts, body)).await
}

/// Extractor for the identity attached by [`authenticate`].
pub struct CurrentUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| PlatformError::unauthorized("Authorization token required!"))
    }
}
