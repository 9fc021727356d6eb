//! API Layer
//!
//! REST endpoints and the middleware stack every request passes through:
//! transaction scope (outermost), then the Auth Gate, then the handler.

pub mod common;
pub mod middleware;
pub mod notes;
pub mod openapi;
pub mod users;

use std::sync::Arc;

use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Json, Router};

use crate::service::AuthGate;

pub use common::*;
pub use middleware::{authenticate, transaction_scope, CurrentUser};
pub use notes::{notes_router, NotesState};
pub use openapi::NotebaseApiDoc;
pub use users::{users_router, UsersState, REFRESH_COOKIE};

/// Liveness
#[utoipa::path(
    get,
    path = "/health",
    tag = "monitoring",
    responses((status = 200, description = "Server is up"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// All routes behind the auth gate and per-request transaction scope.
pub fn router(gate: Arc<AuthGate>, users: UsersState, notes: NotesState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(users_router(users))
        .merge(notes_router(notes))
        .layer(from_fn_with_state(gate, authenticate))
        .layer(from_fn(transaction_scope))
}
