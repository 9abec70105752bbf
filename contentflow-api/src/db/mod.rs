//! Database access for contentflow-api
//!
//! UUIDs are stored as TEXT, timestamps as fixed-width RFC 3339 UTC strings
//! (so they sort lexicographically), lists and maps as JSON text.

pub mod audit;
pub mod contents;
pub mod embedding_cache;
pub mod jobs;

use chrono::{DateTime, SecondsFormat, Utc};
use contentflow_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Create contentflow tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_url TEXT NOT NULL,
            source_title TEXT,
            source_metadata TEXT NOT NULL DEFAULT '{}',
            raw_text TEXT NOT NULL DEFAULT '',
            cleaned_text TEXT,
            key_points TEXT NOT NULL DEFAULT '[]',
            summary TEXT,
            embedding TEXT,
            embedding_model TEXT,
            generated_content TEXT NOT NULL DEFAULT '{}',
            processing_time_ms INTEGER,
            token_count_input INTEGER,
            token_count_output INTEGER,
            cost_usd REAL,
            is_public INTEGER NOT NULL DEFAULT 0,
            is_archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_jobs (
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL REFERENCES contents(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            progress_percent INTEGER NOT NULL DEFAULT 0
                CHECK (progress_percent BETWEEN 0 AND 100),
            current_step TEXT,
            output_content_types TEXT NOT NULL DEFAULT '[]',
            error_message TEXT,
            error_code TEXT,
            started_at TEXT,
            completed_at TEXT,
            estimated_time_remaining_seconds INTEGER,
            session_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_cache (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            content_preview TEXT NOT NULL,
            embedding TEXT NOT NULL,
            embedding_model TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            accessed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_contents_user_created ON contents(user_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_contents_user_updated ON contents(user_id, updated_at)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_content ON processing_jobs(content_id)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status ON processing_jobs(status)",
        "CREATE INDEX IF NOT EXISTS idx_embedding_cache_accessed ON embedding_cache(accessed_at)",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    tracing::info!(
        "Database tables initialized (contents, processing_jobs, embedding_cache, audit_logs)"
    );

    Ok(())
}

pub(crate) fn encode_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

pub(crate) fn decode_opt_ts(field: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| decode_ts(field, &s)).transpose()
}

pub(crate) fn decode_uuid(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

pub(crate) fn encode_json<T: Serialize + ?Sized>(field: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", field, e)))
}

pub(crate) fn decode_json<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", field, e)))
}

pub(crate) fn decode_enum<T>(field: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = contentflow_common::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    init_tables(&pool).await.expect("Failed to create tables");
    pool
}
