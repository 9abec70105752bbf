//! Job endpoints

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::db::audit::{self, AuditAction, ResourceType};
use crate::db::jobs;
use crate::models::ProcessingJobResponse;
use crate::services::CancelOutcome;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ProcessingJobResponse>> {
    let Path(id) = id?;

    let job = jobs::load_job(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    Ok(Json(job.into()))
}

/// POST /api/v1/jobs/:id/cancel
///
/// 409 if the job already reached a terminal state.
pub async fn cancel_job(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ProcessingJobResponse>> {
    let Path(id) = id?;

    match state.runner.cancel(id).await? {
        CancelOutcome::Cancelled(job) => {
            audit::record(
                &state.db,
                state.user_id(),
                AuditAction::Cancel,
                ResourceType::Job,
                id,
                json!({ "content_id": job.content_id, "progress_percent": job.progress_percent }),
            )
            .await;
            Ok(Json(job.into()))
        }
        CancelOutcome::AlreadyTerminal(job) => Err(ApiError::Conflict(format!(
            "Job is already {}",
            job.status
        ))),
    }
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}
