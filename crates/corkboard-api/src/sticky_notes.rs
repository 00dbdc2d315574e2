use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use corkboard_gateway::Actor;
use corkboard_types::api::{
    Claims, CreateStickyNoteRequest, PushStickyNoteRequest, PushStickyNoteResponse,
    UpdateStickyNoteRequest, UpdateStickyNoteStateRequest,
};
use corkboard_types::models::{StickyNote, StickyNoteUserState};

use crate::error::ApiError;
use crate::state::AppState;

pub(crate) fn actor(claims: Claims) -> Actor {
    Actor::new(claims.sub, claims.username)
}

pub async fn list_notes(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<StickyNote>>, ApiError> {
    let notes = state.notes.list_notes(&actor(claims), channel_id).await?;
    Ok(Json(notes))
}

pub async fn create_note(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStickyNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.notes.create_note(&actor(claims), channel_id, req).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StickyNote>, ApiError> {
    let note = state.notes.get_note(&actor(claims), note_id).await?;
    Ok(Json(note))
}

pub async fn update_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateStickyNoteRequest>,
) -> Result<Json<StickyNote>, ApiError> {
    let note = state.notes.update_note(&actor(claims), note_id, patch).await?;
    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.notes.delete_note(&actor(claims), note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn push_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PushStickyNoteRequest>,
) -> Result<Json<PushStickyNoteResponse>, ApiError> {
    let res = state
        .notes
        .push_note(&actor(claims), note_id, req.target_user_ids)
        .await?;
    Ok(Json(res))
}

/// The caller's window state, `null` until they first touch the note.
pub async fn get_state(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Option<StickyNoteUserState>>, ApiError> {
    let user_state = state.notes.get_user_state(&actor(claims), note_id).await?;
    Ok(Json(user_state))
}

pub async fn put_state(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateStickyNoteStateRequest>,
) -> Result<Json<StickyNoteUserState>, ApiError> {
    let user_state = state
        .notes
        .upsert_user_state(&actor(claims), note_id, patch)
        .await?;
    Ok(Json(user_state))
}
