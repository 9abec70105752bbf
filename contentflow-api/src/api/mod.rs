//! HTTP API handlers for contentflow-api

pub mod contents;
pub mod generate;
pub mod health;
pub mod host;
pub mod jobs;
pub mod ws;

pub use contents::content_routes;
pub use generate::generate_routes;
pub use health::health_routes;
pub use host::trusted_host;
pub use jobs::job_routes;
pub use ws::ws_routes;

use axum::Router;

use crate::AppState;

/// Routes mounted under /api/v1
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .merge(generate_routes())
        .merge(content_routes())
        .merge(job_routes())
}
