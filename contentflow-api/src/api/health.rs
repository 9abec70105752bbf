//! Service endpoints: health, root, route index

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub uptime_seconds: u64,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
    /// Which orchestrator implementation is wired in
    pub orchestrator: &'static str,
    pub active_jobs: usize,
    pub open_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    Json(HealthResponse {
        status: "healthy",
        module: "contentflow-api",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.settings.app.environment.clone(),
        uptime_seconds,
        git_hash: env!("GIT_HASH"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        build_profile: env!("BUILD_PROFILE"),
        orchestrator: state.runner.orchestrator_name(),
        active_jobs: state.runner.active_count().await,
        open_sessions: state.registry.connection_count().await,
        last_error: state.runner.last_error().await,
    })
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": state.settings.app.name,
        "docs": "/api/docs",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/docs
pub async fn route_index() -> Json<Value> {
    Json(json!({
        "endpoints": [
            { "method": "POST", "path": "/api/v1/generate", "description": "Submit one source for processing" },
            { "method": "POST", "path": "/api/v1/generate/batch", "description": "Submit up to 10 sources" },
            { "method": "GET", "path": "/api/v1/contents", "description": "List processed content" },
            { "method": "GET", "path": "/api/v1/contents/{id}", "description": "Content with its latest job" },
            { "method": "DELETE", "path": "/api/v1/contents/{id}", "description": "Delete content and its jobs" },
            { "method": "POST", "path": "/api/v1/contents/{id}/export", "description": "Export as json or markdown" },
            { "method": "GET", "path": "/api/v1/jobs/{id}", "description": "Job status" },
            { "method": "POST", "path": "/api/v1/jobs/{id}/cancel", "description": "Cancel a running job" },
            { "method": "GET", "path": "/api/v1/stats", "description": "Usage statistics" },
            { "method": "GET", "path": "/ws/process/{session_id}", "description": "Live progress (WebSocket)" },
            { "method": "GET", "path": "/health", "description": "Service health" },
        ]
    }))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/docs", get(route_index))
}
