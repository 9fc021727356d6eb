//! Notes API Endpoints
//!
//! Owner-only CRUD under `/users/{usersId}/notes`. Deletes are soft.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::api::common::SuccessResponse;
use crate::api::middleware::CurrentUser;
use crate::error::PlatformError;
use crate::service::notes::{DEFAULT_PAGE, DEFAULT_PAGE_LENGTH};
use crate::service::{NoteInput, NotePage, NoteService, NoteView, PageRequest};

#[derive(Clone)]
pub struct NotesState {
    pub note_service: Arc<NoteService>,
}

/// Pagination and cache control for note listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotesQuery {
    /// 1-based page number (default 1)
    pub count: Option<u64>,
    /// Page size (default 10)
    pub length: Option<u64>,
    /// `1` skips the cached page
    pub overwrite: Option<u8>,
}

impl From<NotesQuery> for PageRequest {
    fn from(query: NotesQuery) -> Self {
        Self {
            count: query.count.unwrap_or(DEFAULT_PAGE),
            length: query.length.unwrap_or(DEFAULT_PAGE_LENGTH),
            overwrite: query.overwrite == Some(1),
        }
    }
}

/// Create or update a note
#[derive(Debug, Deserialize, ToSchema)]
pub struct NoteRequest {
    /// 1 = work, 2 = personal
    #[serde(rename = "type")]
    pub note_type: Option<u8>,
    pub remarks: Option<String>,
}

impl From<NoteRequest> for NoteInput {
    fn from(req: NoteRequest) -> Self {
        Self {
            note_type: req.note_type,
            remarks: req.remarks,
        }
    }
}

/// List the caller's active notes
#[utoipa::path(
    get,
    path = "/users/{usersId}/notes",
    tag = "notes",
    params(
        ("usersId" = u64, Path, description = "Owner id, must be the caller"),
        NotesQuery
    ),
    responses(
        (status = 200, description = "One page of notes", body = NotePage),
        (status = 403, description = "Not the caller's notes", body = crate::api::common::ApiError)
    )
)]
pub async fn list_notes(
    State(state): State<NotesState>,
    CurrentUser(caller): CurrentUser,
    Path(users_id): Path<u64>,
    Query(query): Query<NotesQuery>,
) -> Result<Json<NotePage>, PlatformError> {
    let page = state.note_service.list(&caller, users_id, query.into()).await?;
    Ok(Json(page))
}

/// Create a note
#[utoipa::path(
    post,
    path = "/users/{usersId}/notes",
    tag = "notes",
    params(("usersId" = u64, Path, description = "Owner id, must be the caller")),
    request_body = NoteRequest,
    responses(
        (status = 201, description = "Note created", body = NoteView),
        (status = 400, description = "Validation error", body = crate::api::common::ApiError),
        (status = 403, description = "Not the caller's notes", body = crate::api::common::ApiError)
    )
)]
pub async fn create_note(
    State(state): State<NotesState>,
    CurrentUser(caller): CurrentUser,
    Path(users_id): Path<u64>,
    Json(req): Json<NoteRequest>,
) -> Result<(StatusCode, Json<NoteView>), PlatformError> {
    let note = state.note_service.create(&caller, users_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// Update a note
#[utoipa::path(
    patch,
    path = "/users/{usersId}/notes/{notesId}",
    tag = "notes",
    params(
        ("usersId" = u64, Path, description = "Owner id, must be the caller"),
        ("notesId" = u64, Path, description = "Note id")
    ),
    request_body = NoteRequest,
    responses(
        (status = 200, description = "Note updated", body = NoteView),
        (status = 400, description = "Validation error", body = crate::api::common::ApiError),
        (status = 404, description = "Note not found", body = crate::api::common::ApiError)
    )
)]
pub async fn update_note(
    State(state): State<NotesState>,
    CurrentUser(caller): CurrentUser,
    Path((users_id, notes_id)): Path<(u64, u64)>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<NoteView>, PlatformError> {
    let note = state
        .note_service
        .update(&caller, users_id, notes_id, req.into())
        .await?;
    Ok(Json(note))
}

/// Soft-delete a note
#[utoipa::path(
    delete,
    path = "/users/{usersId}/notes/{notesId}",
    tag = "notes",
    params(
        ("usersId" = u64, Path, description = "Owner id, must be the caller"),
        ("notesId" = u64, Path, description = "Note id")
    ),
    responses(
        (status = 200, description = "Note deleted", body = SuccessResponse),
        (status = 404, description = "Note not found", body = crate::api::common::ApiError)
    )
)]
pub async fn delete_note(
    State(state): State<NotesState>,
    CurrentUser(caller): CurrentUser,
    Path((users_id, notes_id)): Path<(u64, u64)>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    state.note_service.delete(&caller, users_id, notes_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

pub fn notes_router(state: NotesState) -> Router {
    Router::new()
        .route("/users/:users_id/notes", get(list_notes).post(create_note))
        .route(
            "/users/:users_id/notes/:notes_id",
            patch(update_note).delete(delete_note),
        )
        .with_state(state)
}
