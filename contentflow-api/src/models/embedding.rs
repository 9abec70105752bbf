//! Embedding cache entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Characters of source text kept alongside a cached embedding
pub const PREVIEW_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub id: Uuid,
    pub content_hash: String,
    pub content_preview: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl EmbeddingCacheEntry {
    pub fn new(text: &str, embedding: Vec<f32>, embedding_model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash(text),
            content_preview: text.chars().take(PREVIEW_CHARS).collect(),
            embedding,
            embedding_model: embedding_model.into(),
            usage_count: 1,
            created_at: now,
            accessed_at: now,
        }
    }
}

/// Lowercase hex SHA-256 of the text
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
