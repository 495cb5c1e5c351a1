//! HTTP routes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use efca_core::{EpisodeSummary, RunStatus, ShutdownToken, StatusSnapshot};
use serde_json::{Value, json};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub status: Arc<RunStatus>,
    pub shutdown: ShutdownToken,
}

/// Build the API application.
///
/// - `GET /health`
/// - `GET /status`: phase, mode, episode count, last reward, uptime
/// - `GET /metrics`: recent episode summaries, oldest first
/// - `POST /shutdown`: request graceful shutdown of the whole process
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/shutdown", post(shutdown))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot())
}

async fn metrics(State(state): State<AppState>) -> Json<Vec<EpisodeSummary>> {
    Json(state.status.recent())
}

async fn shutdown(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let first = state.shutdown.request();
    if first {
        log::info!("Shutdown requested via API");
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({ "shutdown_requested": true, "already_requested": !first })),
    )
}
