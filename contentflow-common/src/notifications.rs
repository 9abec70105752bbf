//! Messages pushed to live processing sessions
//!
//! Wire shape (one JSON text frame per message):
//!
//! ```json
//! { "type": "progress", "data": { "job_id": "...", "progress_percent": 50 }, "timestamp": "..." }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Job status changed (or snapshot sent on connect)
    Status,
    /// Progress checkpoint reached
    Progress,
    /// Job failed or was cancelled
    Error,
    /// Job completed successfully
    Complete,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::Progress => "progress",
            MessageKind::Error => "error",
            MessageKind::Complete => "complete",
        }
    }
}

/// One structured notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(kind: MessageKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
