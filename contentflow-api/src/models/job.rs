//! Processing job state machine
//!
//! PENDING → PROCESSING → COMPLETED | FAILED, with CANCELLED reachable from
//! either non-terminal state. Terminal states accept no further change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::ContentType;

/// Error code recorded for every pipeline failure
pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
/// Error code for jobs orphaned by a service restart
pub const INTERRUPTED: &str = "INTERRUPTED";
/// Error code pushed to the session when a job is cancelled
pub const CANCELLED: &str = "CANCELLED";

pub const STEP_EXTRACTING: &str = "Extracting content...";
pub const STEP_GENERATING: &str = "Generating content...";
pub const STEP_COMPLETE: &str = "Complete!";

pub const PROGRESS_EXTRACTING: i64 = 20;
pub const PROGRESS_GENERATING: i64 = 50;
pub const PROGRESS_COMPLETE: i64 = 100;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Allowed forward edges of the state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state machine step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job is in terminal state {0}")]
    Terminal(JobStatus),

    #[error("Progress cannot go backwards ({current}% -> {requested}%)")]
    ProgressRegression { current: i64, requested: i64 },

    #[error("Progress out of range: {0}")]
    ProgressOutOfRange(i64),
}

/// One run of the pipeline against one content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub content_id: Uuid,

    pub status: JobStatus,
    pub progress_percent: i64,
    pub current_step: Option<String>,

    pub output_content_types: Vec<ContentType>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_time_remaining_seconds: Option<i64>,

    pub session_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// New PENDING job at 0%
    pub fn new(
        content_id: Uuid,
        session_id: impl Into<String>,
        output_content_types: Vec<ContentType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_id,
            status: JobStatus::Pending,
            progress_percent: 0,
            current_step: None,
            output_content_types,
            error_message: None,
            error_code: None,
            started_at: None,
            completed_at: None,
            estimated_time_remaining_seconds: None,
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
            self.estimated_time_remaining_seconds = None;
        }
        Ok(())
    }

    /// PENDING → PROCESSING, first checkpoint
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(self.updated_at);
        self.set_progress(PROGRESS_EXTRACTING, STEP_EXTRACTING)
    }

    /// Move the progress bar forward while PROCESSING
    pub fn advance(&mut self, progress: i64, step: &str) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing {
            return Err(if self.status.is_terminal() {
                TransitionError::Terminal(self.status)
            } else {
                TransitionError::InvalidTransition {
                    from: self.status,
                    to: JobStatus::Processing,
                }
            });
        }
        // 100 is reserved for completion
        if progress >= PROGRESS_COMPLETE {
            return Err(TransitionError::ProgressOutOfRange(progress));
        }
        self.set_progress(progress, step)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.set_progress(PROGRESS_COMPLETE, STEP_COMPLETE)
    }

    pub fn fail(&mut self, code: &str, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error_code = Some(code.to_string());
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.current_step = Some("Cancelled".to_string());
        Ok(())
    }

    /// Milliseconds between start and completion (or now)
    pub fn elapsed_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds().max(0))
    }

    fn set_progress(&mut self, progress: i64, step: &str) -> Result<(), TransitionError> {
        if !(0..=PROGRESS_COMPLETE).contains(&progress) {
            return Err(TransitionError::ProgressOutOfRange(progress));
        }
        if progress < self.progress_percent {
            return Err(TransitionError::ProgressRegression {
                current: self.progress_percent,
                requested: progress,
            });
        }
        self.progress_percent = progress;
        self.current_step = Some(step.to_string());
        Ok(())
    }
}
