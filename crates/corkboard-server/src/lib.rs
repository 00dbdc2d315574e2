pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use corkboard_api::auth::decode_token;
use corkboard_api::{AppStateInner, router};
use corkboard_db::StickyNoteStore;
use corkboard_gateway::{Broadcaster, ConnectionRegistry, Gateway, Session, StickyNoteService, handle_connection};

#[derive(Clone)]
struct GatewayState {
    gateway: Gateway,
    jwt_secret: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    #[serde(default)]
    token: String,
    device_id: Option<String>,
    channel_id: Option<Uuid>,
}

/// Wire the store into a running broadcast worker and build the full app.
/// Must be called inside a Tokio runtime.
pub fn build_app(store: Arc<dyn StickyNoteStore>, jwt_secret: String) -> Router {
    let broadcaster = Broadcaster::spawn(Arc::new(ConnectionRegistry::new()));
    let notes = StickyNoteService::new(store, broadcaster);

    let api_state = Arc::new(AppStateInner {
        notes: notes.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            gateway: Gateway::new(notes),
            jwt_secret: jwt_secret.into(),
        });

    Router::new()
        .merge(router(api_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The token is checked before upgrading so bad clients never get a socket.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = decode_token(&state.jwt_secret, &query.token) else {
        warn!("Rejected gateway upgrade: invalid or missing token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let session = Session {
        user_id: claims.sub,
        username: claims.username,
        device_id: query.device_id,
        channel_id: query.channel_id,
    };
    let gateway = state.gateway;
    ws.on_upgrade(move |socket| handle_connection(socket, gateway, session))
}
