//! HTTP handlers.
//!
//! | Method | Path            | Description                              |
//! |--------|-----------------|------------------------------------------|
//! | GET    | `/health`       | Liveness plus tick and connection counts |
//! | GET    | `/api/snapshot` | Current world snapshot                   |
//! | POST   | `/api/control`  | Pause, resume, or retune the simulation  |
//!
//! `/api/control` takes the same fields as the `control` session message
//! and applies them the same way.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use flowsim_types::{SERVER_VERSION, WorldSnapshot};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::ObserverError;
use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `true` while the server answers.
    pub ok: bool,
    /// Ticks completed.
    pub tick: u64,
    /// Current simulation rate.
    pub tick_hz: u32,
    /// Whether the tick loop is parked.
    pub paused: bool,
    /// Active sessions.
    pub connections: usize,
    /// Whole seconds since start.
    pub uptime_seconds: u64,
    /// Server build version.
    pub server_version: &'static str,
}

/// Body of `POST /api/control`.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    /// Pause flag set by this request, if any.
    pub applied_pause: Option<bool>,
    /// Rate set by this request, if any.
    pub applied_tick_hz: Option<u32>,
    /// Pause flag after the request.
    pub paused: bool,
    /// Rate after the request.
    pub tick_hz: u32,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let tick = state.world.read().await.tick();
    Json(HealthResponse {
        ok: true,
        tick,
        tick_hz: state.control.tick_hz(),
        paused: state.control.is_paused(),
        connections: state.connection_count().await,
        uptime_seconds: state.control.uptime_seconds(),
        server_version: SERVER_VERSION,
    })
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// `GET /api/snapshot`
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Json<WorldSnapshot> {
    Json(state.world.read().await.snapshot())
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// `POST /api/control`
pub async fn control(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<ControlResponse>, ObserverError> {
    let Value::Object(fields) = body else {
        return Err(ObserverError::InvalidRequest(
            "control body must be a JSON object".to_owned(),
        ));
    };

    let change = state.control.apply_message(&fields);
    info!(paused = ?change.paused, tick_hz = ?change.tick_hz, "Control applied via HTTP");

    Ok(Json(ControlResponse {
        applied_pause: change.paused,
        applied_tick_hz: change.tick_hz,
        paused: state.control.is_paused(),
        tick_hz: state.control.tick_hz(),
    }))
}
