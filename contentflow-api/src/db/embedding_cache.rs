//! Embedding cache operations
//!
//! Entries expire `ttl_seconds` after their last access and the table is
//! capped at `max_entries`, evicting least-recently-accessed rows first.

use chrono::{Duration, Utc};
use contentflow_common::Result;
use sqlx::{Row, SqlitePool};

use super::{decode_json, decode_ts, decode_uuid, encode_json, encode_ts};
use crate::models::EmbeddingCacheEntry;

/// Look up an embedding by content hash, refreshing its access time on a hit
pub async fn lookup(
    pool: &SqlitePool,
    content_hash: &str,
    ttl_seconds: u64,
) -> Result<Option<EmbeddingCacheEntry>> {
    let now = Utc::now();
    // A TTL too large to represent never expires anything
    let cutoff = i64::try_from(ttl_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_sub_signed(ttl));

    if let Some(cutoff) = cutoff {
        let purged = sqlx::query("DELETE FROM embedding_cache WHERE accessed_at < ?")
            .bind(encode_ts(&cutoff))
            .execute(pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Expired embedding cache entries removed");
        }
    }

    let row = sqlx::query(
        r#"
        UPDATE embedding_cache
        SET usage_count = usage_count + 1, accessed_at = ?
        WHERE content_hash = ?
        RETURNING id, content_hash, content_preview, embedding, embedding_model,
                  usage_count, created_at, accessed_at
        "#,
    )
    .bind(encode_ts(&now))
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id: String = row.get("id");
    let embedding: String = row.get("embedding");
    let created_at: String = row.get("created_at");
    let accessed_at: String = row.get("accessed_at");

    Ok(Some(EmbeddingCacheEntry {
        id: decode_uuid("id", &id)?,
        content_hash: row.get("content_hash"),
        content_preview: row.get("content_preview"),
        embedding: decode_json("embedding", &embedding)?,
        embedding_model: row.get("embedding_model"),
        usage_count: row.get("usage_count"),
        created_at: decode_ts("created_at", &created_at)?,
        accessed_at: decode_ts("accessed_at", &accessed_at)?,
    }))
}

/// Store an entry, then trim the table to `max_entries`
///
/// Returns the number of entries evicted.
pub async fn insert(
    pool: &SqlitePool,
    entry: &EmbeddingCacheEntry,
    max_entries: u64,
) -> Result<u64> {
    let embedding = encode_json("embedding", &entry.embedding)?;

    sqlx::query(
        r#"
        INSERT INTO embedding_cache (
            id, content_hash, content_preview, embedding, embedding_model,
            usage_count, created_at, accessed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO UPDATE SET
            embedding = excluded.embedding,
            embedding_model = excluded.embedding_model,
            usage_count = embedding_cache.usage_count + 1,
            accessed_at = excluded.accessed_at
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.content_hash)
    .bind(&entry.content_preview)
    .bind(embedding)
    .bind(&entry.embedding_model)
    .bind(entry.usage_count)
    .bind(encode_ts(&entry.created_at))
    .bind(encode_ts(&entry.accessed_at))
    .execute(pool)
    .await?;

    let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);
    let evicted = sqlx::query(
        r#"
        DELETE FROM embedding_cache
        WHERE id NOT IN (
            SELECT id FROM embedding_cache ORDER BY accessed_at DESC, id LIMIT ?
        )
        "#,
    )
    .bind(keep)
    .execute(pool)
    .await?
    .rows_affected();

    if evicted > 0 {
        tracing::debug!(evicted, max_entries, "Embedding cache trimmed");
    }

    Ok(evicted)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache")
        .fetch_one(pool)
        .await?)
}
