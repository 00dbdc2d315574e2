use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use corkboard_gateway::NoteError;

/// HTTP face of a failed operation. Bodies are `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Note(#[from] NoteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Self::Note(err) = self;
        let status = match &err {
            NoteError::NotFound(_) => StatusCode::NOT_FOUND,
            NoteError::Unauthorized => StatusCode::UNAUTHORIZED,
            NoteError::Forbidden(_) => StatusCode::FORBIDDEN,
            NoteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NoteError::Storage(e) => {
                error!("Request failed: {:#}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}
