//! Content database operations

use contentflow_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::jobs::insert_job;
use super::{decode_enum, decode_json, decode_ts, decode_uuid, encode_json, encode_ts};
use crate::models::{Content, ContentStatistics, ListQuery, ProcessingJob};

const CONTENT_COLUMNS: &str = r#"
    id, user_id, source_type, source_url, source_title, source_metadata,
    raw_text, cleaned_text, key_points, summary, embedding, embedding_model,
    generated_content, processing_time_ms, token_count_input, token_count_output,
    cost_usd, is_public, is_archived, created_at, updated_at
"#;

/// Insert a new content record and its first job in one transaction
pub async fn insert_content_with_job(
    pool: &SqlitePool,
    content: &Content,
    job: &ProcessingJob,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    insert_content(&mut *tx, content).await?;
    insert_job(&mut *tx, job).await?;
    tx.commit().await?;
    Ok(())
}

/// Insert several content records with their jobs; all or none are stored
pub async fn insert_contents_with_jobs(
    pool: &SqlitePool,
    entries: &[(Content, ProcessingJob)],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (content, job) in entries {
        insert_content(&mut *tx, content).await?;
        insert_job(&mut *tx, job).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn insert_content(conn: &mut SqliteConnection, content: &Content) -> Result<()> {
    let source_metadata = encode_json("source_metadata", &content.source_metadata)?;
    let key_points = encode_json("key_points", &content.key_points)?;
    let embedding = content
        .embedding
        .as_ref()
        .map(|e| encode_json("embedding", e))
        .transpose()?;
    let generated_content = encode_json("generated_content", &content.generated_content)?;

    sqlx::query(&format!(
        "INSERT INTO contents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        CONTENT_COLUMNS
    ))
    .bind(content.id.to_string())
    .bind(&content.user_id)
    .bind(content.source_type.as_str())
    .bind(&content.source_url)
    .bind(&content.source_title)
    .bind(source_metadata)
    .bind(&content.raw_text)
    .bind(&content.cleaned_text)
    .bind(key_points)
    .bind(&content.summary)
    .bind(embedding)
    .bind(&content.embedding_model)
    .bind(generated_content)
    .bind(content.processing_time_ms)
    .bind(content.token_count_input)
    .bind(content.token_count_output)
    .bind(content.cost_usd)
    .bind(content.is_public)
    .bind(content.is_archived)
    .bind(encode_ts(&content.created_at))
    .bind(encode_ts(&content.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Write the pipeline results onto an existing content record
pub(crate) async fn update_processed_content(
    conn: &mut SqliteConnection,
    content: &Content,
) -> Result<bool> {
    let key_points = encode_json("key_points", &content.key_points)?;
    let embedding = content
        .embedding
        .as_ref()
        .map(|e| encode_json("embedding", e))
        .transpose()?;
    let generated_content = encode_json("generated_content", &content.generated_content)?;

    let result = sqlx::query(
        r#"
        UPDATE contents SET
            source_title = ?,
            raw_text = ?,
            cleaned_text = ?,
            key_points = ?,
            summary = ?,
            embedding = ?,
            embedding_model = ?,
            generated_content = ?,
            processing_time_ms = ?,
            token_count_input = ?,
            token_count_output = ?,
            cost_usd = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&content.source_title)
    .bind(&content.raw_text)
    .bind(&content.cleaned_text)
    .bind(key_points)
    .bind(&content.summary)
    .bind(embedding)
    .bind(&content.embedding_model)
    .bind(generated_content)
    .bind(content.processing_time_ms)
    .bind(content.token_count_input)
    .bind(content.token_count_output)
    .bind(content.cost_usd)
    .bind(encode_ts(&content.updated_at))
    .bind(content.id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Load content by id
pub async fn load_content(pool: &SqlitePool, id: Uuid) -> Result<Option<Content>> {
    let row = sqlx::query(&format!("SELECT {} FROM contents WHERE id = ?", CONTENT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| content_from_row(&r)).transpose()
}

/// One page of a user's content plus the total count
pub async fn list_contents(
    pool: &SqlitePool,
    user_id: &str,
    query: &ListQuery,
) -> Result<(Vec<Content>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contents WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    // Column and direction come from closed enums, never from user text
    let sql = format!(
        "SELECT {} FROM contents WHERE user_id = ? ORDER BY {} {}, id {} LIMIT ? OFFSET ?",
        CONTENT_COLUMNS,
        query.sort_by.column(),
        query.sort_order.keyword(),
        query.sort_order.keyword(),
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(query.limit)
        .bind(query.skip)
        .fetch_all(pool)
        .await?;

    let items = rows
        .iter()
        .map(content_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok((items, total))
}

/// Delete content and its jobs; false if it did not exist
pub async fn delete_content(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let id = id.to_string();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM processing_jobs WHERE content_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM contents WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() == 1)
}

/// Aggregates over a user's content that has a completed job
pub async fn content_statistics(pool: &SqlitePool, user_id: &str) -> Result<ContentStatistics> {
    const COMPLETED_FILTER: &str = r#"
        c.user_id = ? AND EXISTS (
            SELECT 1 FROM processing_jobs j
            WHERE j.content_id = c.id AND j.status = 'completed'
        )
    "#;

    let totals = sqlx::query(&format!(
        r#"
        SELECT
            COUNT(*) AS total_processed,
            CAST(COALESCE(SUM(COALESCE(c.token_count_input, 0) + COALESCE(c.token_count_output, 0)), 0) AS INTEGER) AS total_tokens,
            CAST(COALESCE(SUM(c.cost_usd), 0) AS REAL) AS total_cost,
            CAST(COALESCE(AVG(c.processing_time_ms), 0) AS REAL) AS avg_time
        FROM contents c
        WHERE {}
        "#,
        COMPLETED_FILTER
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let by_source_type: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT c.source_type, COUNT(*) FROM contents c WHERE {} GROUP BY c.source_type",
        COMPLETED_FILTER
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let by_content_type: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(&format!(
        r#"
        SELECT g.key, COUNT(*)
        FROM contents c, json_each(c.generated_content) g
        WHERE {}
        GROUP BY g.key
        "#,
        COMPLETED_FILTER
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    Ok(ContentStatistics {
        total_processed: totals.get("total_processed"),
        total_tokens_used: totals.get("total_tokens"),
        total_cost_usd: totals.get("total_cost"),
        average_processing_time_ms: totals.get("avg_time"),
        by_content_type,
        by_source_type,
    })
}

fn content_from_row(row: &SqliteRow) -> Result<Content> {
    let id: String = row.get("id");
    let source_type: String = row.get("source_type");
    let source_metadata: String = row.get("source_metadata");
    let key_points: String = row.get("key_points");
    let embedding: Option<String> = row.get("embedding");
    let generated_content: String = row.get("generated_content");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Content {
        id: decode_uuid("id", &id)?,
        user_id: row.get("user_id"),
        source_type: decode_enum("source_type", &source_type)?,
        source_url: row.get("source_url"),
        source_title: row.get("source_title"),
        source_metadata: decode_json("source_metadata", &source_metadata)?,
        raw_text: row.get("raw_text"),
        cleaned_text: row.get("cleaned_text"),
        key_points: decode_json("key_points", &key_points)?,
        summary: row.get("summary"),
        embedding: embedding
            .map(|e| decode_json("embedding", &e))
            .transpose()?,
        embedding_model: row.get("embedding_model"),
        generated_content: decode_json("generated_content", &generated_content)?,
        processing_time_ms: row.get("processing_time_ms"),
        token_count_input: row.get("token_count_input"),
        token_count_output: row.get("token_count_output"),
        cost_usd: row.get("cost_usd"),
        is_public: row.get("is_public"),
        is_archived: row.get("is_archived"),
        created_at: decode_ts("created_at", &created_at)?,
        updated_at: decode_ts("updated_at", &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::jobs::{complete_with_content, load_job};
    use crate::db::test_pool;
    use crate::models::{
        ContentType, GeneratedItem, SortField, SortOrder, SourceMetadata, SourceType,
    };
    use chrono::Duration;

    fn sample(user: &str, offset_secs: i64) -> (Content, ProcessingJob) {
        let mut content = Content::new(
            user,
            SourceType::Article,
            "https://x.com/a",
            SourceMetadata::default(),
        );
        content.created_at = content.created_at + Duration::seconds(offset_secs);
        content.updated_at = content.created_at;
        let job = ProcessingJob::new(
            content.id,
            Uuid::new_v4().to_string(),
            vec![ContentType::BlogPost],
        );
        (content, job)
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let pool = test_pool().await;
        let first = sample("user_demo", 0);
        let (content, mut job) = sample("user_demo", 1);
        job.session_id = first.1.session_id.clone();

        let result = insert_contents_with_jobs(&pool, &[first.clone(), (content, job)]).await;
        assert!(result.is_err());
        assert!(load_content(&pool, first.0.id).await.unwrap().is_none());
        assert!(load_job(&pool, first.1.id).await.unwrap().is_none());

        let batch = [sample("user_demo", 0), sample("user_demo", 1)];
        insert_contents_with_jobs(&pool, &batch).await.unwrap();
        for (content, job) in &batch {
            assert!(load_content(&pool, content.id).await.unwrap().is_some());
            assert!(load_job(&pool, job.id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let pool = test_pool().await;
        let (content, job) = sample("user_demo", 0);
        insert_content_with_job(&pool, &content, &job).await.unwrap();

        let loaded = load_content(&pool, content.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, content.id);
        assert_eq!(loaded.source_type, SourceType::Article);
        assert_eq!(loaded.source_url, content.source_url);
        assert_eq!(loaded.source_metadata, content.source_metadata);
        assert!(loaded.raw_text.is_empty());
        assert!(loaded.generated_content.is_empty());
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            content.created_at.timestamp_micros()
        );
        assert!(load_job(&pool, job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_job_insert_rolls_back_content() {
        let pool = test_pool().await;
        let (content, job) = sample("user_demo", 0);
        insert_content_with_job(&pool, &content, &job).await.unwrap();

        // Same session id violates the unique constraint
        let (other, mut dup) = sample("user_demo", 1);
        dup.session_id = job.session_id.clone();
        assert!(insert_content_with_job(&pool, &other, &dup).await.is_err());
        assert!(load_content(&pool, other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_jobs() {
        let pool = test_pool().await;
        let (content, job) = sample("user_demo", 0);
        insert_content_with_job(&pool, &content, &job).await.unwrap();

        assert!(delete_content(&pool, content.id).await.unwrap());
        assert!(load_content(&pool, content.id).await.unwrap().is_none());
        assert!(load_job(&pool, job.id).await.unwrap().is_none());
        assert!(!delete_content(&pool, content.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_key_cascade_without_explicit_job_delete() {
        let pool = test_pool().await;
        let (content, job) = sample("user_demo", 0);
        insert_content_with_job(&pool, &content, &job).await.unwrap();

        sqlx::query("DELETE FROM contents WHERE id = ?")
            .bind(content.id.to_string())
            .execute(&pool)
            .await
            .unwrap();
        assert!(load_job(&pool, job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_paginates_and_sorts() {
        let pool = test_pool().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let (content, job) = sample("user_demo", i);
            insert_content_with_job(&pool, &content, &job).await.unwrap();
            ids.push(content.id);
        }
        let (other, other_job) = sample("someone_else", 10);
        insert_content_with_job(&pool, &other, &other_job).await.unwrap();

        let query = ListQuery {
            skip: 1,
            limit: 2,
            sort_by: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
        };
        let (page, total) = list_contents(&pool, "user_demo", &query).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ids[3], ids[2]]);

        let query = ListQuery {
            sort_order: SortOrder::Asc,
            ..query
        };
        let (page, _) = list_contents(&pool, "user_demo", &query).await.unwrap();
        assert_eq!(page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn test_statistics_count_only_completed() {
        let pool = test_pool().await;

        let (mut done, mut done_job) = sample("user_demo", 0);
        insert_content_with_job(&pool, &done, &done_job).await.unwrap();
        done_job.start().unwrap();
        done_job.complete().unwrap();
        done.generated_content
            .insert(ContentType::BlogPost, GeneratedItem::new("post"));
        done.token_count_input = Some(100);
        done.token_count_output = Some(50);
        done.cost_usd = Some(0.25);
        done.processing_time_ms = Some(1200);
        assert!(complete_with_content(&pool, &done, &done_job).await.unwrap());

        let (pending, pending_job) = sample("user_demo", 1);
        insert_content_with_job(&pool, &pending, &pending_job).await.unwrap();

        let stats = content_statistics(&pool, "user_demo").await.unwrap();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.total_tokens_used, 150);
        assert!((stats.total_cost_usd - 0.25).abs() < f64::EPSILON);
        assert!((stats.average_processing_time_ms - 1200.0).abs() < f64::EPSILON);
        assert_eq!(stats.by_content_type.get("blog_post"), Some(&1));
        assert_eq!(stats.by_source_type.get("article"), Some(&1));
    }

    #[tokio::test]
    async fn test_statistics_empty() {
        let pool = test_pool().await;
        let stats = content_statistics(&pool, "user_demo").await.unwrap();
        assert_eq!(stats, ContentStatistics::default());
    }
}
