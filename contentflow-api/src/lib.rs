//! ContentFlow API library
//!
//! Accepts source URLs, runs them through extraction and generation on an
//! external AI orchestrator, and serves the results over REST plus a
//! per-session WebSocket for progress.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use contentflow_common::config::Settings;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::{AiOrchestrator, JobRunner, RunnerConfig, SessionRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub runner: JobRunner,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings, orchestrator: Arc<dyn AiOrchestrator>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let runner = JobRunner::new(
            db.clone(),
            Arc::clone(&registry),
            orchestrator,
            RunnerConfig::from_settings(&settings),
        );

        Self {
            db,
            settings: Arc::new(settings),
            registry,
            runner,
            startup_time: Utc::now(),
        }
    }

    /// User every request acts as
    pub fn user_id(&self) -> &str {
        &self.settings.app.default_user_id
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors.origins);

    let api = Router::new()
        .nest("/api/v1", api::v1_routes())
        .merge(api::health_routes())
        .layer(CompressionLayer::new());

    Router::new()
        .merge(api)
        .merge(api::ws_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::trusted_host,
        ))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        // Credentials rule out the `*` wildcard, so requested headers are echoed
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .expose_headers([header::CONTENT_DISPOSITION])
}
