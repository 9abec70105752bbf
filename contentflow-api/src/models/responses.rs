//! Response schemas

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{Content, ExportFormat, GeneratedContent, JobStatus, ProcessingJob, SourceType};

/// 202 body for an accepted submission
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub job_id: Uuid,
    pub session_id: String,
    /// Always "queued"
    pub status: &'static str,
    pub message: String,
    pub ws_url: String,
}

impl GenerateResponse {
    pub fn queued(job_id: Uuid, session_id: String) -> Self {
        Self {
            job_id,
            ws_url: format!("/ws/process/{}", session_id),
            session_id,
            status: "queued",
            message: "Processing started. Connect to WebSocket for updates.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchGenerateResponse {
    pub jobs: Vec<GenerateResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingJobResponse {
    pub id: Uuid,
    pub content_id: Uuid,
    pub status: JobStatus,
    pub progress_percent: i64,
    pub current_step: Option<String>,
    pub estimated_time_remaining_seconds: Option<i64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ProcessingJob> for ProcessingJobResponse {
    fn from(job: ProcessingJob) -> Self {
        Self {
            id: job.id,
            content_id: job.content_id,
            status: job.status,
            progress_percent: job.progress_percent,
            current_step: job.current_step,
            estimated_time_remaining_seconds: job.estimated_time_remaining_seconds,
            error_message: job.error_message,
            error_code: job.error_code,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

/// Public view of a content record; raw text and embedding stay internal
#[derive(Debug, Clone, Serialize)]
pub struct ContentResponse {
    pub id: Uuid,
    pub user_id: String,

    pub source_type: SourceType,
    pub source_url: String,
    pub source_title: Option<String>,

    pub summary: Option<String>,
    pub key_points: Vec<String>,

    pub generated_content: GeneratedContent,

    pub processing_time_ms: Option<i64>,
    pub token_count_input: Option<i64>,
    pub token_count_output: Option<i64>,
    pub cost_usd: Option<f64>,

    pub is_public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub processing_job: Option<ProcessingJobResponse>,
}

impl ContentResponse {
    pub fn new(content: Content, latest_job: Option<ProcessingJob>) -> Self {
        Self {
            id: content.id,
            user_id: content.user_id,
            source_type: content.source_type,
            source_url: content.source_url,
            source_title: content.source_title,
            summary: content.summary,
            key_points: content.key_points,
            generated_content: content.generated_content,
            processing_time_ms: content.processing_time_ms,
            token_count_input: content.token_count_input,
            token_count_output: content.token_count_output,
            cost_usd: content.cost_usd,
            is_public: content.is_public,
            created_at: content.created_at,
            updated_at: content.updated_at,
            processing_job: latest_job.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentListResponse {
    pub items: Vec<ContentResponse>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub format: ExportFormat,
    /// Object for json, string for markdown
    pub data: serde_json::Value,
}

/// Aggregates over the user's completed content
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentStatistics {
    pub total_processed: i64,
    pub total_tokens_used: i64,
    pub total_cost_usd: f64,
    pub average_processing_time_ms: f64,
    pub by_content_type: BTreeMap<String, i64>,
    pub by_source_type: BTreeMap<String, i64>,
}
