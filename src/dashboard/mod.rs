use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::db::{Database, SnapshotKind};
use crate::messages::{QueueError, RequestSender};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Manual refreshes go through the same queue as the coordinator's own
    pub requests: RequestSender,
}

/// Build the Axum router for the snapshot endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/standings", get(standings_handler))
        .route("/api/schedule", get(schedule_handler))
        .route("/api/roster", get(roster_handler))
        .route("/api/game", get(game_handler))
        .route("/api/refresh/:operation", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health_handler() -> &'static str {
    "ok"
}

/// GET /api/standings
async fn standings_handler(State(state): State<Arc<AppState>>) -> Response {
    snapshot_response(&state.db, SnapshotKind::Standings)
}

/// GET /api/schedule
async fn schedule_handler(State(state): State<Arc<AppState>>) -> Response {
    snapshot_response(&state.db, SnapshotKind::Schedule)
}

/// GET /api/roster
async fn roster_handler(State(state): State<Arc<AppState>>) -> Response {
    snapshot_response(&state.db, SnapshotKind::Roster)
}

/// GET /api/game: the most recent live-game snapshot
async fn game_handler(State(state): State<Arc<AppState>>) -> Response {
    snapshot_response(&state.db, SnapshotKind::LiveGame)
}

/// Stored JSON is served as-is; it was validated when it was saved.
fn snapshot_response(db: &Database, kind: SnapshotKind) -> Response {
    match db.load_json(kind) {
        Ok(Some(body)) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("no {} snapshot yet", kind)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    game_id: Option<String>,
}

/// POST /api/refresh/:operation?game_id=...
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let args: Vec<String> = params.game_id.into_iter().collect();
    let request = state
        .requests
        .submit_named(&operation, &args, 0)
        .map_err(|e| {
            let status = match e {
                QueueError::UnknownOperation(_) | QueueError::InvalidArguments { .. } => {
                    StatusCode::BAD_REQUEST
                }
                QueueError::Full | QueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, e.to_string())
        })?;

    info!("Manual refresh queued: {}", request);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "queued": request.to_string() })),
    ))
}
