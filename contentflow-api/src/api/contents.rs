//! Content endpoints: list, get, delete, export, statistics

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::db::audit::{self, AuditAction, ResourceType};
use crate::db::{contents, jobs};
use crate::models::{
    ContentListResponse, ContentResponse, ContentStatistics, ExportRequest, ExportResponse,
    ListQuery,
};
use crate::services::export;
use crate::{ApiError, ApiResult, AppState};

fn content_not_found() -> ApiError {
    ApiError::NotFound("Content not found".to_string())
}

/// GET /api/v1/contents
pub async fn list_contents(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ContentListResponse>> {
    let Query(query) = query?;
    query.validate()?;

    let (items, total) = contents::list_contents(&state.db, state.user_id(), &query).await?;

    let mut responses = Vec::with_capacity(items.len());
    for content in items {
        let latest = jobs::latest_job_for_content(&state.db, content.id).await?;
        responses.push(ContentResponse::new(content, latest));
    }

    Ok(Json(ContentListResponse {
        items: responses,
        total,
        skip: query.skip,
        limit: query.limit,
        has_more: query.skip.saturating_add(query.limit) < total,
    }))
}

/// GET /api/v1/contents/:id
pub async fn get_content(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ContentResponse>> {
    let Path(id) = id?;

    let content = contents::load_content(&state.db, id)
        .await?
        .ok_or_else(content_not_found)?;
    let latest = jobs::latest_job_for_content(&state.db, id).await?;

    Ok(Json(ContentResponse::new(content, latest)))
}

/// DELETE /api/v1/contents/:id
///
/// Running pipelines for the content are stopped first; their rows go with
/// the content.
pub async fn delete_content(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;

    for job_id in jobs::active_job_ids_for_content(&state.db, id).await? {
        state.runner.signal_cancel(job_id).await;
    }

    if !contents::delete_content(&state.db, id).await? {
        return Err(content_not_found());
    }

    tracing::info!(content_id = %id, "Content deleted");
    audit::record(
        &state.db,
        state.user_id(),
        AuditAction::Delete,
        ResourceType::Content,
        id,
        json!({}),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/contents/:id/export
pub async fn export_content(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> ApiResult<Json<ExportResponse>> {
    let Path(id) = id?;
    let Json(request) = payload?;

    if let Some(body_id) = request.content_id {
        if body_id != id {
            return Err(ApiError::BadRequest(
                "content_id in body does not match the URL".to_string(),
            ));
        }
    }

    let content = contents::load_content(&state.db, id)
        .await?
        .ok_or_else(content_not_found)?;
    let latest = jobs::latest_job_for_content(&state.db, id).await?;

    let data = export::render(content, latest, request.format, request.include_metadata)?;

    audit::record(
        &state.db,
        state.user_id(),
        AuditAction::Export,
        ResourceType::Content,
        id,
        json!({ "format": request.format.as_str() }),
    )
    .await;

    Ok(Json(ExportResponse {
        success: true,
        format: request.format,
        data,
    }))
}

/// GET /api/v1/stats
pub async fn content_statistics(
    State(state): State<AppState>,
) -> ApiResult<Json<ContentStatistics>> {
    Ok(Json(
        contents::content_statistics(&state.db, state.user_id()).await?,
    ))
}

pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/contents", get(list_contents))
        .route("/contents/:id", get(get_content).delete(delete_content))
        .route("/contents/:id/export", post(export_content))
        .route("/stats", get(content_statistics))
}
