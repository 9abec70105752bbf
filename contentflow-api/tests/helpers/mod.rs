//! Shared test fixtures: in-memory app, scripted orchestrator, HTTP helpers

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use contentflow_api::db;
use contentflow_api::models::{
    ContentType, GeneratedContent, GeneratedItem, JobStatus, ProcessingJob, SourceType,
};
use contentflow_api::services::{
    AiOrchestrator, ExtractedContent, GenerationOptions, GenerationResult, TokenUsage,
};
use contentflow_api::{build_router, AppState};
use contentflow_common::config::Settings;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use uuid::Uuid;

/// Orchestrator whose behavior each test scripts up front
pub struct MockOrchestrator {
    pub extracted: ExtractedContent,
    pub generated: GenerationResult,
    pub extract_error: Option<String>,
    pub generate_error: Option<String>,
    pub panic_in_generate: bool,
    pub extract_delay: Option<Duration>,
    /// Extraction blocks until a permit is added
    pub extract_gate: Option<Arc<Semaphore>>,
    /// Return embedding `[n]` on the n-th extraction
    pub embedding_per_call: bool,
    pub extract_calls: AtomicUsize,
    pub seen_options: Mutex<Vec<GenerationOptions>>,
}

impl MockOrchestrator {
    /// Extractor `{text T, summary S, key_points [p1]}`, generator `{blog_post}`
    pub fn succeeding() -> Self {
        let mut outputs = GeneratedContent::new();
        let mut post = GeneratedItem::new("A blog post about T");
        post.title = Some("Post".to_string());
        outputs.insert(ContentType::BlogPost, post);
        outputs.insert(ContentType::TwitterThread, GeneratedItem::new("1/ thread"));

        Self {
            extracted: ExtractedContent {
                text: "T".to_string(),
                summary: Some("S".to_string()),
                key_points: vec!["p1".to_string()],
                title: Some("Source title".to_string()),
                ..Default::default()
            },
            generated: GenerationResult {
                outputs,
                usage: Some(TokenUsage {
                    input_tokens: 120,
                    output_tokens: 80,
                    cost_usd: Some(0.002),
                }),
            },
            extract_error: None,
            generate_error: None,
            panic_in_generate: false,
            extract_delay: None,
            extract_gate: None,
            embedding_per_call: false,
            extract_calls: AtomicUsize::new(0),
            seen_options: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_extract(message: &str) -> Self {
        Self {
            extract_error: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    pub fn failing_generate(message: &str) -> Self {
        Self {
            generate_error: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            extract_gate: Some(gate),
            ..Self::succeeding()
        }
    }
}

#[async_trait]
impl AiOrchestrator for MockOrchestrator {
    async fn extract_content(
        &self,
        _url: &str,
        _source_type: SourceType,
    ) -> anyhow::Result<ExtractedContent> {
        let call = self.extract_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.extract_gate {
            gate.acquire().await?.forget();
        }
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.extract_error {
            return Err(anyhow!("{}", message));
        }

        let mut extracted = self.extracted.clone();
        if self.embedding_per_call {
            extracted.embedding = Some(vec![call as f32]);
            extracted.embedding_model = Some("mock-embedding".to_string());
        }
        Ok(extracted)
    }

    async fn generate_content(
        &self,
        _extracted: &ExtractedContent,
        options: &GenerationOptions,
    ) -> anyhow::Result<GenerationResult> {
        self.seen_options
            .lock()
            .expect("options lock")
            .push(options.clone());

        if self.panic_in_generate {
            panic!("generator exploded");
        }
        if let Some(message) = &self.generate_error {
            return Err(anyhow!("{}", message));
        }
        Ok(self.generated.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub async fn test_pool() -> SqlitePool {
    let pool = contentflow_common::db::init_memory_pool()
        .await
        .expect("in-memory pool");
    db::init_tables(&pool).await.expect("tables");
    pool
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.processing.task_timeout_seconds = 5;
    settings
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub orchestrator: Arc<MockOrchestrator>,
}

pub async fn test_app(orchestrator: MockOrchestrator) -> TestApp {
    test_app_with(orchestrator, test_settings()).await
}

pub async fn test_app_with(orchestrator: MockOrchestrator, settings: Settings) -> TestApp {
    let orchestrator = Arc::new(orchestrator);
    let state = AppState::new(test_pool().await, settings, orchestrator.clone());
    TestApp {
        router: build_router(state.clone()),
        state,
        orchestrator,
    }
}

impl TestApp {
    /// Send a request; the body is parsed as JSON when present
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost");
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Send a prepared request and hand back the whole response
    pub async fn raw(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, None).await
    }

    /// Submit one article and return (job_id, session_id)
    pub async fn submit_article(&self, url: &str) -> (Uuid, String) {
        let (status, body) = self
            .post(
                "/api/v1/generate",
                serde_json::json!({
                    "source_url": url,
                    "source_type": "article",
                    "content_types": ["blog_post"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "submit failed: {}", body);
        let job_id = body["job_id"].as_str().unwrap().parse().unwrap();
        let session_id = body["session_id"].as_str().unwrap().to_string();
        (job_id, session_id)
    }

    pub async fn wait_for_terminal(&self, job_id: Uuid) -> ProcessingJob {
        wait_for(&self.state.db, job_id, |job| job.is_terminal()).await
    }

    pub async fn wait_for_status(&self, job_id: Uuid, status: JobStatus) -> ProcessingJob {
        wait_for(&self.state.db, job_id, |job| job.status == status).await
    }

    /// Wait until the job's background task has fully finished
    pub async fn wait_until_idle(&self, job_id: Uuid) {
        for _ in 0..400 {
            if !self.state.runner.is_active(job_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never went idle", job_id);
    }
}

pub async fn wait_for<F>(pool: &SqlitePool, job_id: Uuid, done: F) -> ProcessingJob
where
    F: Fn(&ProcessingJob) -> bool,
{
    for _ in 0..400 {
        if let Some(job) = db::jobs::load_job(pool, job_id).await.unwrap() {
            if done(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach the expected state in time", job_id);
}
