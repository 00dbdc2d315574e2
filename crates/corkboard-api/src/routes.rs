use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{folders, sticky_notes};

/// All REST routes. Every route requires a bearer token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/channels/{channel_id}/sticky-notes",
            get(sticky_notes::list_notes).post(sticky_notes::create_note),
        )
        .route(
            "/sticky-notes/{note_id}",
            get(sticky_notes::get_note)
                .patch(sticky_notes::update_note)
                .delete(sticky_notes::delete_note),
        )
        .route("/sticky-notes/{note_id}/push", post(sticky_notes::push_note))
        .route(
            "/sticky-notes/{note_id}/state",
            get(sticky_notes::get_state).put(sticky_notes::put_state),
        )
        .route(
            "/channels/{channel_id}/sticky-note-folders",
            get(folders::list_folders).post(folders::create_folder),
        )
        .route(
            "/sticky-note-folders/{folder_id}",
            patch(folders::update_folder).delete(folders::delete_folder),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
