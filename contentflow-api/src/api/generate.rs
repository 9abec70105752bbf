//! Submission endpoints
//!
//! POST /generate and POST /generate/batch. Both answer 202 once the job rows
//! are committed; processing continues in the background.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::db::audit::{self, AuditAction, ResourceType};
use crate::models::{BatchGenerateRequest, BatchGenerateResponse, GenerateRequest, GenerateResponse};
use crate::services::SubmittedJob;
use crate::{ApiResult, AppState};

/// POST /api/v1/generate
pub async fn generate_content(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let Json(request) = payload?;
    let submitted = submit(&state, request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse::queued(submitted.job_id, submitted.session_id)),
    ))
}

/// POST /api/v1/generate/batch
///
/// Every URL is validated and every job row committed before any pipeline
/// starts; a failure leaves no job behind.
pub async fn generate_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchGenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BatchGenerateResponse>)> {
    let Json(batch) = payload?;
    let requests = batch.into_requests()?;
    let source_urls: Vec<String> = requests.iter().map(|r| r.source_url.clone()).collect();

    let submitted = state.runner.submit_batch(state.user_id(), requests).await?;

    let mut jobs = Vec::with_capacity(submitted.len());
    for (submitted, source_url) in submitted.iter().zip(source_urls) {
        record_creation(&state, submitted, source_url).await;
        jobs.push(GenerateResponse::queued(submitted.job_id, submitted.session_id.clone()));
    }

    tracing::info!(count = jobs.len(), "Batch submission queued");

    Ok((StatusCode::ACCEPTED, Json(BatchGenerateResponse { jobs })))
}

async fn submit(state: &AppState, request: GenerateRequest) -> ApiResult<SubmittedJob> {
    let source_url = request.source_url.clone();
    let submitted = state.runner.submit(state.user_id(), request).await?;
    record_creation(state, &submitted, source_url).await;
    Ok(submitted)
}

async fn record_creation(state: &AppState, submitted: &SubmittedJob, source_url: String) {
    audit::record(
        &state.db,
        state.user_id(),
        AuditAction::Create,
        ResourceType::Content,
        submitted.content_id,
        json!({ "job_id": submitted.job_id, "source_url": source_url }),
    )
    .await;
}

pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_content))
        .route("/generate/batch", post(generate_batch))
}
