//! Status and control HTTP API
//!
//! Read endpoints serve the state published by the last pass; nothing here
//! blocks on a pass in flight.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mpsync_core::{Error, SchedulerHandle, SyncOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub interval_secs: u64,
    pub last_outcome: Option<SyncOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    /// New delay between passes, in seconds
    pub interval: u64,
}

/// Build the API router around a scheduler handle
pub fn router(handle: SchedulerHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(status))
        .route("/api/mappings", get(mappings))
        .route("/api/history", get(history))
        .route("/api/sync", post(trigger_sync))
        .route("/api/interval", post(update_interval))
        .with_state(handle)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(handle): State<SchedulerHandle>) -> Json<StatusResponse> {
    let state = handle.state();
    Json(StatusResponse {
        running: handle.is_running(),
        interval_secs: handle.interval().as_secs(),
        last_outcome: state.last_outcome.clone(),
    })
}

async fn mappings(State(handle): State<SchedulerHandle>) -> Response {
    match handle.state().last_snapshot.clone() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no sync pass has completed yet"),
    }
}

async fn history(State(handle): State<SchedulerHandle>) -> Json<Vec<SyncOutcome>> {
    Json(handle.state().history.iter().cloned().collect())
}

async fn trigger_sync(State(handle): State<SchedulerHandle>) -> Response {
    match handle.trigger() {
        Ok(_) => (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response(),
        Err(Error::SyncInProgress) => {
            debug!("Manual sync rejected, pass in progress");
            error_response(StatusCode::CONFLICT, "a sync pass is already in progress")
        }
        Err(e) => {
            warn!("Manual sync failed to start: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn update_interval(
    State(handle): State<SchedulerHandle>,
    Json(request): Json<IntervalRequest>,
) -> Response {
    match handle.set_interval(Duration::from_secs(request.interval)) {
        Ok(()) => {
            info!(interval_secs = request.interval, "Sync interval updated via API");
            Json(json!({ "interval": request.interval })).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
