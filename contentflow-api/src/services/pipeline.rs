//! Job pipeline
//!
//! One supervised tokio task per job. The task walks the job through
//! PROCESSING (extraction, then generation) to COMPLETED or FAILED. Each
//! checkpoint is committed before its notification is pushed, so a client
//! never hears about a state that isn't in the database yet.

use anyhow::{anyhow, Context};
use contentflow_common::config::Settings;
use contentflow_common::{Error, MessageKind, NotificationMessage, Result};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::orchestrator::{AiOrchestrator, ExtractedContent, GenerationOptions};
use super::registry::SessionRegistry;
use crate::db;
use crate::models::job::{CANCELLED, PROCESSING_ERROR, PROGRESS_GENERATING, STEP_GENERATING};
use crate::models::{content_hash, Content, EmbeddingCacheEntry, GenerateRequest, ProcessingJob};

/// Attempts to win the race against a concurrently advancing pipeline
const CANCEL_ATTEMPTS: usize = 5;

/// Knobs taken from `Settings`
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub task_timeout: Duration,
    pub enable_vector_deduplication: bool,
    pub cache_max_entries: u64,
    pub cache_ttl_seconds: u64,
}

impl RunnerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            task_timeout: Duration::from_secs(settings.processing.task_timeout_seconds),
            enable_vector_deduplication: settings.processing.enable_vector_deduplication,
            cache_max_entries: u64::from(settings.embedding_cache.max_entries),
            cache_ttl_seconds: settings.embedding_cache.ttl_seconds,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Identifiers handed back to the submitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: Uuid,
    pub content_id: Uuid,
    pub session_id: String,
}

/// Result of a cancel request
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(ProcessingJob),
    AlreadyTerminal(ProcessingJob),
}

/// Reasons a run stops without being a failure
#[derive(Debug, thiserror::Error)]
enum Halt {
    #[error("job cancelled")]
    Cancelled,
    #[error("job already finished elsewhere")]
    Superseded,
}

#[derive(Clone)]
pub struct JobRunner {
    db: SqlitePool,
    registry: Arc<SessionRegistry>,
    orchestrator: Arc<dyn AiOrchestrator>,
    config: RunnerConfig,
    /// One token per running job; presence marks the job as active
    cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Most recent pipeline failure, surfaced by /health
    last_error: Arc<RwLock<Option<String>>>,
}

impl JobRunner {
    pub fn new(
        db: SqlitePool,
        registry: Arc<SessionRegistry>,
        orchestrator: Arc<dyn AiOrchestrator>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            db,
            registry,
            orchestrator,
            config,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn orchestrator_name(&self) -> &'static str {
        self.orchestrator.name()
    }

    /// Validate, persist Content + PENDING job, start the pipeline
    ///
    /// Returns as soon as the rows are committed; never waits on the pipeline.
    pub async fn submit(&self, user_id: &str, request: GenerateRequest) -> Result<SubmittedJob> {
        let (content, job) = prepare(user_id, &request)?;
        db::contents::insert_content_with_job(&self.db, &content, &job).await?;
        Ok(self.start(&content, &job, request))
    }

    /// Submit several requests; either every job is stored or none is
    ///
    /// Nothing is spawned until all rows are committed.
    pub async fn submit_batch(
        &self,
        user_id: &str,
        requests: Vec<GenerateRequest>,
    ) -> Result<Vec<SubmittedJob>> {
        let entries = requests
            .iter()
            .map(|request| prepare(user_id, request))
            .collect::<Result<Vec<_>>>()?;

        db::contents::insert_contents_with_jobs(&self.db, &entries).await?;

        Ok(entries
            .iter()
            .zip(requests)
            .map(|((content, job), request)| self.start(content, job, request))
            .collect())
    }

    fn start(&self, content: &Content, job: &ProcessingJob, request: GenerateRequest) -> SubmittedJob {
        info!(
            job_id = %job.id,
            content_id = %content.id,
            session_id = %job.session_id,
            source_type = %request.source_type,
            "Processing job queued"
        );

        self.spawn(job.id, request);

        SubmittedJob {
            job_id: job.id,
            content_id: content.id,
            session_id: job.session_id.clone(),
        }
    }

    /// Run the pipeline for `job_id` in a supervised background task
    ///
    /// The supervisor turns a panic inside the pipeline into a FAILED job.
    pub fn spawn(&self, job_id: Uuid, request: GenerateRequest) -> JoinHandle<()> {
        let runner = self.clone();

        tokio::spawn(async move {
            let Some(token) = runner.register(job_id).await else {
                warn!(job_id = %job_id, "Job already running, duplicate run refused");
                return;
            };

            let worker = {
                let runner = runner.clone();
                let token = token.clone();
                tokio::spawn(async move { runner.run(job_id, &request, &token).await })
            };

            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => match e.downcast_ref::<Halt>() {
                    Some(halt) => info!(job_id = %job_id, reason = %halt, "Pipeline stopped"),
                    None => {
                        error!(job_id = %job_id, error = %format!("{:#}", e), "Processing job failed");
                        runner.fail_job(job_id, &format!("{:#}", e)).await;
                    }
                },
                Err(join_error) => {
                    let detail = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "pipeline task was aborted".to_string()
                    };
                    error!(job_id = %job_id, detail = %detail, "Pipeline task crashed");
                    runner
                        .fail_job(job_id, &format!("Pipeline crashed: {}", detail))
                        .await;
                }
            }

            runner.unregister(job_id).await;
        })
    }

    async fn register(&self, job_id: Uuid) -> Option<CancellationToken> {
        let mut tokens = self.cancellation_tokens.write().await;
        if tokens.contains_key(&job_id) {
            return None;
        }
        let token = CancellationToken::new();
        tokens.insert(job_id, token.clone());
        Some(token)
    }

    async fn unregister(&self, job_id: Uuid) {
        self.cancellation_tokens.write().await.remove(&job_id);
    }

    pub async fn is_active(&self, job_id: Uuid) -> bool {
        self.cancellation_tokens.read().await.contains_key(&job_id)
    }

    pub async fn active_count(&self) -> usize {
        self.cancellation_tokens.read().await.len()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Pipeline body; invoked once per job by [`JobRunner::spawn`]
    async fn run(
        &self,
        job_id: Uuid,
        request: &GenerateRequest,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let Some(mut job) = db::jobs::load_job(&self.db, job_id).await? else {
            warn!(job_id = %job_id, "Job not found at pipeline start");
            return Ok(());
        };
        if job.is_terminal() {
            info!(job_id = %job_id, status = %job.status, "Job already finished, nothing to run");
            return Ok(());
        }

        // 1. Extraction
        job.start()?;
        self.checkpoint(&job).await?;
        self.notify(&job, MessageKind::Status, status_data(&job)).await;
        self.notify(&job, MessageKind::Progress, status_data(&job)).await;

        info!(job_id = %job_id, url = %request.source_url, "Extracting content");
        let mut extracted = self
            .guarded(
                token,
                "Content extraction",
                self.orchestrator
                    .extract_content(&request.source_url, request.source_type),
            )
            .await?;

        if self.config.enable_vector_deduplication {
            self.deduplicate_embedding(job_id, &mut extracted).await;
        }

        // 2. Generation
        job.advance(PROGRESS_GENERATING, STEP_GENERATING)?;
        self.checkpoint(&job).await?;
        self.notify(&job, MessageKind::Progress, status_data(&job)).await;

        let options = GenerationOptions {
            content_types: job.output_content_types.clone(),
            tone: request.tone.clone(),
            target_audience: request.target_audience.clone(),
            include_hashtags: request.include_hashtags,
            include_emojis: request.include_emojis,
            language: request.language.clone(),
            custom_instructions: request.custom_instructions.clone(),
        };

        info!(job_id = %job_id, content_types = ?options.content_types, "Generating content");
        let generated = self
            .guarded(
                token,
                "Content generation",
                self.orchestrator.generate_content(&extracted, &options),
            )
            .await?;

        // 3. Commit results and completion together
        let Some(mut content) = db::contents::load_content(&self.db, job.content_id).await? else {
            return Err(Halt::Superseded.into());
        };

        job.complete()?;

        content.source_title = extracted.title.or(content.source_title);
        content.raw_text = extracted.text;
        content.cleaned_text = extracted.cleaned_text;
        content.summary = extracted.summary;
        content.key_points = extracted.key_points;
        content.embedding = extracted.embedding;
        content.embedding_model = extracted.embedding_model;
        content.generated_content = generated
            .outputs
            .into_iter()
            .filter(|(content_type, _)| job.output_content_types.contains(content_type))
            .map(|(content_type, mut item)| {
                if item.character_count == 0 {
                    item.character_count = item.body.chars().count();
                }
                (content_type, item)
            })
            .collect();
        if let Some(usage) = generated.usage {
            content.token_count_input = Some(usage.input_tokens);
            content.token_count_output = Some(usage.output_tokens);
            content.cost_usd = usage.cost_usd;
        }
        content.processing_time_ms = job.elapsed_ms();
        content.updated_at = job.updated_at;

        if !db::jobs::complete_with_content(&self.db, &content, &job).await? {
            return Err(Halt::Superseded.into());
        }

        info!(
            job_id = %job_id,
            content_id = %content.id,
            processing_time_ms = ?content.processing_time_ms,
            "Processing job completed"
        );

        let mut data = status_data(&job);
        data["content_id"] = json!(content.id);
        data["content_types"] = json!(content.generated_content.keys().collect::<Vec<_>>());
        data["processing_time_ms"] = json!(content.processing_time_ms);
        self.notify(&job, MessageKind::Complete, data).await;

        Ok(())
    }

    /// Persist a step; a refused write means the job was finished elsewhere
    async fn checkpoint(&self, job: &ProcessingJob) -> anyhow::Result<()> {
        if db::jobs::save_checkpoint(&self.db, job).await? {
            Ok(())
        } else {
            Err(Halt::Superseded.into())
        }
    }

    /// Await an external call under the job's timeout and cancellation token
    async fn guarded<T, F>(
        &self,
        token: &CancellationToken,
        step: &str,
        call: F,
    ) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.config.task_timeout;
        tokio::select! {
            _ = token.cancelled() => Err(Halt::Cancelled.into()),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result.with_context(|| format!("{} failed", step)),
                Err(_) => Err(anyhow!("{} timed out after {}s", step, timeout.as_secs())),
            },
        }
    }

    /// Reuse a cached embedding for identical text, or cache the new one
    ///
    /// Cache trouble only costs the optimization, never the job.
    async fn deduplicate_embedding(&self, job_id: Uuid, extracted: &mut ExtractedContent) {
        if extracted.text.is_empty() {
            return;
        }
        let hash = content_hash(&extracted.text);

        match db::embedding_cache::lookup(&self.db, &hash, self.config.cache_ttl_seconds).await {
            Ok(Some(hit)) => {
                debug!(job_id = %job_id, usage_count = hit.usage_count, "Embedding cache hit");
                extracted.embedding = Some(hit.embedding);
                extracted.embedding_model = Some(hit.embedding_model);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Embedding cache lookup failed");
                return;
            }
        }

        if let (Some(embedding), Some(model)) = (&extracted.embedding, &extracted.embedding_model) {
            let entry = EmbeddingCacheEntry::new(&extracted.text, embedding.clone(), model.clone());
            if let Err(e) =
                db::embedding_cache::insert(&self.db, &entry, self.config.cache_max_entries).await
            {
                warn!(job_id = %job_id, error = %e, "Embedding cache insert failed");
            }
        }
    }

    /// Record FAILED with PROCESSING_ERROR unless the job already finished
    async fn fail_job(&self, job_id: Uuid, message: &str) {
        *self.last_error.write().await = Some(format!("job {}: {}", job_id, message));

        let mut job = match db::jobs::load_job(&self.db, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load job for failure recording");
                return;
            }
        };
        if job.fail(PROCESSING_ERROR, message).is_err() {
            return;
        }

        match db::jobs::save_checkpoint(&self.db, &job).await {
            Ok(true) => {
                let mut data = status_data(&job);
                data["error_code"] = json!(PROCESSING_ERROR);
                data["error_message"] = json!(message);
                self.notify(&job, MessageKind::Error, data).await;
            }
            Ok(false) => debug!(job_id = %job_id, "Job finished before failure could be recorded"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job failure"),
        }
    }

    /// Mark a job CANCELLED and stop its pipeline
    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome> {
        for _ in 0..CANCEL_ATTEMPTS {
            let mut job = db::jobs::load_job(&self.db, job_id)
                .await?
                .ok_or_else(|| Error::NotFound("Job not found".to_string()))?;

            if job.is_terminal() {
                return Ok(CancelOutcome::AlreadyTerminal(job));
            }
            job.cancel()
                .map_err(|e| Error::Internal(e.to_string()))?;

            // Refused when the pipeline advanced in between; reload and retry
            if !db::jobs::save_checkpoint(&self.db, &job).await? {
                continue;
            }

            self.signal_cancel(job_id).await;
            info!(job_id = %job_id, "Processing job cancelled");

            let mut data = status_data(&job);
            data["error_code"] = json!(CANCELLED);
            data["error_message"] = json!("Job cancelled");
            self.notify(&job, MessageKind::Error, data).await;

            return Ok(CancelOutcome::Cancelled(job));
        }

        Err(Error::Internal(format!(
            "Could not cancel job {} after {} attempts",
            job_id, CANCEL_ATTEMPTS
        )))
    }

    /// Stop a running pipeline without touching the job row
    pub async fn signal_cancel(&self, job_id: Uuid) {
        if let Some(token) = self.cancellation_tokens.read().await.get(&job_id) {
            token.cancel();
        }
    }

    async fn notify(&self, job: &ProcessingJob, kind: MessageKind, data: serde_json::Value) {
        let delivered = self
            .registry
            .push(&job.session_id, NotificationMessage::new(kind, data))
            .await;
        debug!(
            job_id = %job.id,
            session_id = %job.session_id,
            kind = kind.as_str(),
            delivered,
            "Notification pushed"
        );
    }
}

/// Build the content record and PENDING job for a validated request
fn prepare(user_id: &str, request: &GenerateRequest) -> Result<(Content, ProcessingJob)> {
    request
        .validate()
        .map_err(|e| Error::InvalidInput(e.to_string()))?;

    let content = Content::new(
        user_id,
        request.source_type,
        request.source_url.clone(),
        request.source_metadata(),
    );
    let job = ProcessingJob::new(
        content.id,
        Uuid::new_v4().to_string(),
        request.unique_content_types(),
    );
    Ok((content, job))
}

/// Common payload describing a job's persisted state
pub fn status_data(job: &ProcessingJob) -> serde_json::Value {
    json!({
        "job_id": job.id,
        "status": job.status,
        "progress_percent": job.progress_percent,
        "current_step": job.current_step,
    })
}

/// Snapshot sent to a client when it connects to a session
pub fn status_snapshot(job: &ProcessingJob) -> NotificationMessage {
    let mut data = status_data(job);
    if job.error_code.is_some() {
        data["error_code"] = json!(job.error_code);
        data["error_message"] = json!(job.error_message);
    }
    NotificationMessage::new(MessageKind::Status, data)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
