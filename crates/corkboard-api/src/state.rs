use std::sync::Arc;

use corkboard_gateway::StickyNoteService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub notes: StickyNoteService,
    pub jwt_secret: String,
}
