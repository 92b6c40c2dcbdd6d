//! HTTP handlers
//!
//! Every book and note mutation goes through the [`MutationRecorder`]; the
//! recorder works on blocking SQLite connections, so it runs on the blocking
//! pool.
//!
//! [`MutationRecorder`]: crate::core_sync::MutationRecorder

use super::auth::AuthenticatedUser;
use super::error::ApiResult;
use super::state::AppState;
use super::types::*;
use crate::core_sync::{
    BookUpdate, FragmentRequest, MutationRecorder, NewBook, NewNote, NoteUpdate, SyncError,
    SyncResult,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

async fn with_recorder<T, F>(state: &AppState, f: F) -> SyncResult<T>
where
    F: FnOnce(&MutationRecorder) -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    let recorder = state.recorder.clone();
    tokio::task::spawn_blocking(move || f(&recorder))
        .await
        .map_err(|e| SyncError::Internal(format!("blocking task failed: {}", e)))?
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Sync
// ============================================================================

/// GET /sync/state
pub async fn get_sync_state(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> ApiResult<Json<SyncStateResponse>> {
    let sync_state = state.handler.get_sync_state(user_id).await?;
    Ok(Json(sync_state.into()))
}

/// GET /sync/fragment?after_usn=&limit=
pub async fn get_sync_fragment(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Query(params): Query<FragmentParams>,
) -> ApiResult<Json<FragmentResponse>> {
    let request = FragmentRequest::parse(params.after_usn.as_deref(), params.limit.as_deref())?;
    let fragment = state.handler.get_sync_fragment(user_id, request).await?;
    Ok(Json(FragmentResponse::from(&fragment)))
}

// ============================================================================
// Books
// ============================================================================

/// POST /books
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Json(req): Json<CreateBookRequest>,
) -> ApiResult<(StatusCode, Json<BookItem>)> {
    let new = NewBook {
        uuid: req.uuid,
        label: req.label,
        added_on: req.added_on,
    };
    let book = with_recorder(&state, move |r| r.create_book(user_id, new)).await?;
    Ok((StatusCode::CREATED, Json(BookItem::from(&book))))
}

/// PATCH /books/:uuid
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<UpdateBookRequest>,
) -> ApiResult<Json<BookItem>> {
    let update = BookUpdate { label: req.label };
    let book = with_recorder(&state, move |r| r.update_book(user_id, &uuid, update)).await?;
    Ok(Json(BookItem::from(&book)))
}

/// DELETE /books/:uuid[?notes=true]
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(uuid): Path<Uuid>,
    Query(params): Query<DeleteBookParams>,
) -> ApiResult<Json<DeleteBookResponse>> {
    let (book, notes) = if params.notes {
        with_recorder(&state, move |r| r.delete_book_with_notes(user_id, &uuid)).await?
    } else {
        let book = with_recorder(&state, move |r| r.delete_book(user_id, &uuid)).await?;
        (book, Vec::new())
    };

    Ok(Json(DeleteBookResponse {
        book: BookItem::from(&book),
        deleted_notes: notes.iter().map(NoteItem::from).collect(),
    }))
}

// ============================================================================
// Notes
// ============================================================================

/// POST /notes
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Json(req): Json<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<NoteItem>)> {
    let new = NewNote {
        uuid: req.uuid,
        book_uuid: req.book_uuid,
        body: req.content,
        public: req.public,
        added_on: req.added_on,
    };
    let note = with_recorder(&state, move |r| r.create_note(user_id, new)).await?;
    Ok((StatusCode::CREATED, Json(NoteItem::from(&note))))
}

/// PATCH /notes/:uuid
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> ApiResult<Json<NoteItem>> {
    let update = NoteUpdate {
        book_uuid: req.book_uuid,
        body: req.content,
        public: req.public,
    };
    let note = with_recorder(&state, move |r| r.update_note(user_id, &uuid, update)).await?;
    Ok(Json(NoteItem::from(&note)))
}

/// DELETE /notes/:uuid
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<NoteItem>> {
    let note = with_recorder(&state, move |r| r.delete_note(user_id, &uuid)).await?;
    Ok(Json(NoteItem::from(&note)))
}
