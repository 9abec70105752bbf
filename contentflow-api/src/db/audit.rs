//! Audit log
//!
//! Written by handlers after the audited change has been committed. A failed
//! audit write is logged and never fails the request.

use chrono::Utc;
use contentflow_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{encode_json, encode_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Delete,
    Export,
    Cancel,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Delete => "delete",
            AuditAction::Export => "export",
            AuditAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Content,
    Job,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Content => "content",
            ResourceType::Job => "job",
        }
    }
}

pub async fn insert_audit_log(
    pool: &SqlitePool,
    user_id: &str,
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: Uuid,
    details: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(action.as_str())
    .bind(resource_type.as_str())
    .bind(resource_id.to_string())
    .bind(encode_json("details", details)?)
    .bind(encode_ts(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert an audit entry, logging instead of returning failures
pub async fn record(
    pool: &SqlitePool,
    user_id: &str,
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: Uuid,
    details: serde_json::Value,
) {
    if let Err(e) =
        insert_audit_log(pool, user_id, action, resource_type, resource_id, &details).await
    {
        tracing::warn!(
            action = action.as_str(),
            resource_id = %resource_id,
            error = %e,
            "Failed to write audit log"
        );
    }
}

/// Actions recorded against one resource, oldest first
pub async fn actions_for_resource(pool: &SqlitePool, resource_id: Uuid) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT action FROM audit_logs WHERE resource_id = ? ORDER BY created_at, rowid",
    )
    .bind(resource_id.to_string())
    .fetch_all(pool)
    .await?)
}
