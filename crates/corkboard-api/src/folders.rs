use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use corkboard_types::api::{Claims, CreateFolderRequest, UpdateFolderRequest};
use corkboard_types::models::StickyNoteFolder;

use crate::error::ApiError;
use crate::state::AppState;
use crate::sticky_notes::actor;

pub async fn list_folders(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<StickyNoteFolder>>, ApiError> {
    let folders = state.notes.list_folders(&actor(claims), channel_id).await?;
    Ok(Json(folders))
}

pub async fn create_folder(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = state.notes.create_folder(&actor(claims), channel_id, req).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

pub async fn update_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateFolderRequest>,
) -> Result<Json<StickyNoteFolder>, ApiError> {
    let folder = state.notes.update_folder(&actor(claims), folder_id, patch).await?;
    Ok(Json(folder))
}

/// Notes filed under the folder are detached, not deleted.
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.notes.delete_folder(&actor(claims), folder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
