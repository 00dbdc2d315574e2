pub mod auth;
pub mod error;
pub mod folders;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod sticky_notes;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
