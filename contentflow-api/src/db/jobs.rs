//! Processing job database operations
//!
//! Every UPDATE carries a non-terminal guard, so once a job reaches
//! COMPLETED, FAILED or CANCELLED a late writer affects zero rows.

use chrono::Utc;
use contentflow_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::contents::update_processed_content;
use super::{
    decode_enum, decode_json, decode_opt_ts, decode_ts, decode_uuid, encode_json, encode_ts,
};
use crate::models::job::INTERRUPTED;
use crate::models::{Content, ProcessingJob};

const JOB_COLUMNS: &str = r#"
    id, content_id, status, progress_percent, current_step, output_content_types,
    error_message, error_code, started_at, completed_at,
    estimated_time_remaining_seconds, session_id, created_at, updated_at
"#;

const NOT_TERMINAL: &str = "status IN ('pending', 'processing')";

pub(crate) async fn insert_job(conn: &mut SqliteConnection, job: &ProcessingJob) -> Result<()> {
    let output_content_types = encode_json("output_content_types", &job.output_content_types)?;

    sqlx::query(&format!(
        "INSERT INTO processing_jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        JOB_COLUMNS
    ))
    .bind(job.id.to_string())
    .bind(job.content_id.to_string())
    .bind(job.status.as_str())
    .bind(job.progress_percent)
    .bind(&job.current_step)
    .bind(output_content_types)
    .bind(&job.error_message)
    .bind(&job.error_code)
    .bind(job.started_at.as_ref().map(encode_ts))
    .bind(job.completed_at.as_ref().map(encode_ts))
    .bind(job.estimated_time_remaining_seconds)
    .bind(&job.session_id)
    .bind(encode_ts(&job.created_at))
    .bind(encode_ts(&job.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load job by id
pub async fn load_job(pool: &SqlitePool, id: Uuid) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM processing_jobs WHERE id = ?",
        JOB_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Load the job bound to a notification session
pub async fn load_job_by_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM processing_jobs WHERE session_id = ?",
        JOB_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Most recently created job for a content record
pub async fn latest_job_for_content(
    pool: &SqlitePool,
    content_id: Uuid,
) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM processing_jobs WHERE content_id = ? ORDER BY created_at DESC LIMIT 1",
        JOB_COLUMNS
    ))
    .bind(content_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Ids of a content record's jobs that have not reached a terminal state
pub async fn active_job_ids_for_content(pool: &SqlitePool, content_id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT id FROM processing_jobs WHERE content_id = ? AND {}",
        NOT_TERMINAL
    ))
    .bind(content_id.to_string())
    .fetch_all(pool)
    .await?;

    ids.iter().map(|id| decode_uuid("id", id)).collect()
}

/// Persist a state machine step
///
/// Returns false (and writes nothing) if the stored job is already terminal
/// or further along than `job`.
pub async fn save_checkpoint(pool: &SqlitePool, job: &ProcessingJob) -> Result<bool> {
    let mut conn = pool.acquire().await?;
    update_job(&mut conn, job).await
}

async fn update_job(conn: &mut SqliteConnection, job: &ProcessingJob) -> Result<bool> {
    let result = sqlx::query(&format!(
        r#"
        UPDATE processing_jobs SET
            status = ?,
            progress_percent = ?,
            current_step = ?,
            error_message = ?,
            error_code = ?,
            started_at = ?,
            completed_at = ?,
            estimated_time_remaining_seconds = ?,
            updated_at = ?
        WHERE id = ? AND {} AND progress_percent <= ?
        "#,
        NOT_TERMINAL
    ))
    .bind(job.status.as_str())
    .bind(job.progress_percent)
    .bind(&job.current_step)
    .bind(&job.error_message)
    .bind(&job.error_code)
    .bind(job.started_at.as_ref().map(encode_ts))
    .bind(job.completed_at.as_ref().map(encode_ts))
    .bind(job.estimated_time_remaining_seconds)
    .bind(encode_ts(&job.updated_at))
    .bind(job.id.to_string())
    .bind(job.progress_percent)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store pipeline results and mark the job COMPLETED in one transaction
///
/// Returns false, leaving the content untouched, if the job was finished by
/// someone else (cancelled, deleted) in the meantime.
pub async fn complete_with_content(
    pool: &SqlitePool,
    content: &Content,
    job: &ProcessingJob,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    if !update_job(&mut *tx, job).await? {
        tx.rollback().await?;
        return Ok(false);
    }
    if !update_processed_content(&mut *tx, content).await? {
        tx.rollback().await?;
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}

/// Mark jobs orphaned by a previous process as FAILED
pub async fn fail_interrupted_jobs(pool: &SqlitePool) -> Result<u64> {
    let now = encode_ts(&Utc::now());
    let result = sqlx::query(&format!(
        r#"
        UPDATE processing_jobs
        SET status = 'failed',
            error_code = ?,
            error_message = 'Processing interrupted by a service restart',
            completed_at = ?,
            estimated_time_remaining_seconds = NULL,
            updated_at = ?
        WHERE {}
        "#,
        NOT_TERMINAL
    ))
    .bind(INTERRUPTED)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn job_from_row(row: &SqliteRow) -> Result<ProcessingJob> {
    let id: String = row.get("id");
    let content_id: String = row.get("content_id");
    let status: String = row.get("status");
    let output_content_types: String = row.get("output_content_types");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ProcessingJob {
        id: decode_uuid("id", &id)?,
        content_id: decode_uuid("content_id", &content_id)?,
        status: decode_enum("status", &status)?,
        progress_percent: row.get("progress_percent"),
        current_step: row.get("current_step"),
        output_content_types: decode_json("output_content_types", &output_content_types)?,
        error_message: row.get("error_message"),
        error_code: row.get("error_code"),
        started_at: decode_opt_ts("started_at", row.get("started_at"))?,
        completed_at: decode_opt_ts("completed_at", row.get("completed_at"))?,
        estimated_time_remaining_seconds: row.get("estimated_time_remaining_seconds"),
        session_id: row.get("session_id"),
        created_at: decode_ts("created_at", &created_at)?,
        updated_at: decode_ts("updated_at", &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contents::{insert_content_with_job, load_content};
    use crate::db::test_pool;
    use crate::models::job::PROCESSING_ERROR;
    use crate::models::{ContentType, JobStatus, SourceMetadata, SourceType};

    async fn seeded() -> (SqlitePool, Content, ProcessingJob) {
        let pool = test_pool().await;
        let content = Content::new(
            "user_demo",
            SourceType::Article,
            "https://x.com/a",
            SourceMetadata::default(),
        );
        let job = ProcessingJob::new(content.id, "session-1", vec![ContentType::BlogPost]);
        insert_content_with_job(&pool, &content, &job).await.unwrap();
        (pool, content, job)
    }

    #[tokio::test]
    async fn test_load_by_session_and_latest() {
        let (pool, content, job) = seeded().await;

        let by_session = load_job_by_session(&pool, "session-1").await.unwrap().unwrap();
        assert_eq!(by_session.id, job.id);
        assert_eq!(by_session.status, JobStatus::Pending);
        assert_eq!(by_session.output_content_types, vec![ContentType::BlogPost]);

        let latest = latest_job_for_content(&pool, content.id).await.unwrap().unwrap();
        assert_eq!(latest.id, job.id);
        assert!(load_job_by_session(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoints_persist() {
        let (pool, _, mut job) = seeded().await;

        job.start().unwrap();
        assert!(save_checkpoint(&pool, &job).await.unwrap());

        let stored = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.progress_percent, 20);
        assert!(stored.started_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_job_rejects_late_writes() {
        let (pool, _, mut job) = seeded().await;
        job.start().unwrap();
        save_checkpoint(&pool, &job).await.unwrap();

        let mut cancelled = job.clone();
        cancelled.cancel().unwrap();
        assert!(save_checkpoint(&pool, &cancelled).await.unwrap());

        // Stale in-memory copy keeps running
        job.advance(50, "Generating content...").unwrap();
        assert!(!save_checkpoint(&pool, &job).await.unwrap());

        let stored = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.progress_percent, 20);
    }

    #[tokio::test]
    async fn test_complete_is_refused_after_cancel() {
        let (pool, content, mut job) = seeded().await;
        job.start().unwrap();
        save_checkpoint(&pool, &job).await.unwrap();

        let mut cancelled = job.clone();
        cancelled.cancel().unwrap();
        save_checkpoint(&pool, &cancelled).await.unwrap();

        let mut processed = content.clone();
        processed.summary = Some("late".to_string());
        job.complete().unwrap();
        assert!(!complete_with_content(&pool, &processed, &job).await.unwrap());

        let stored = load_content(&pool, content.id).await.unwrap().unwrap();
        assert!(stored.summary.is_none());
    }

    #[tokio::test]
    async fn test_complete_writes_content_and_job() {
        let (pool, content, mut job) = seeded().await;
        job.start().unwrap();
        save_checkpoint(&pool, &job).await.unwrap();

        let mut processed = content.clone();
        processed.summary = Some("S".to_string());
        processed.key_points = vec!["p1".to_string()];
        job.complete().unwrap();
        assert!(complete_with_content(&pool, &processed, &job).await.unwrap());

        let stored_job = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored_job.status, JobStatus::Completed);
        assert_eq!(stored_job.progress_percent, 100);
        let stored = load_content(&pool, content.id).await.unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("S"));
        assert_eq!(stored.key_points, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_interrupted_jobs_marked_failed() {
        let (pool, content, job) = seeded().await;

        let mut finished = ProcessingJob::new(content.id, "session-2", vec![ContentType::BlogPost]);
        {
            let mut conn = pool.acquire().await.unwrap();
            insert_job(&mut conn, &finished).await.unwrap();
        }
        finished.fail(PROCESSING_ERROR, "boom").unwrap();
        save_checkpoint(&pool, &finished).await.unwrap();

        assert_eq!(fail_interrupted_jobs(&pool).await.unwrap(), 1);

        let stored = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_code.as_deref(), Some(INTERRUPTED));
        assert!(stored.completed_at.is_some());

        let untouched = load_job(&pool, finished.id).await.unwrap().unwrap();
        assert_eq!(untouched.error_code.as_deref(), Some(PROCESSING_ERROR));
        assert!(active_job_ids_for_content(&pool, content.id).await.unwrap().is_empty());
    }
}
