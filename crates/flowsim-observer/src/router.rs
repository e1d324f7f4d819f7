//! Axum router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router.
///
/// - `GET /ws` -- client sessions
/// - `GET /health` -- liveness and counters
/// - `GET /api/snapshot` -- current world snapshot
/// - `POST /api/control` -- pause and tick rate
///
/// CORS allows any origin so a browser client can be served from elsewhere.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(handlers::health))
        .route("/api/snapshot", get(handlers::snapshot))
        .route("/api/control", post(handlers::control))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
