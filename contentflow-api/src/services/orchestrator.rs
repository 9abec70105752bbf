//! AI orchestration boundary
//!
//! Extraction (source URL → text, summary, key points, embedding) and
//! generation (extracted text → styled outputs) run outside this service.
//! The pipeline only sees the [`AiOrchestrator`] trait.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{ContentType, GeneratedContent, SourceType};

const USER_AGENT: &str = concat!("contentflow/", env!("CARGO_PKG_VERSION"));

/// Output of the extraction step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub text: String,
    #[serde(default)]
    pub cleaned_text: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Source-specific extras (duration, author, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Style parameters passed to the generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub content_types: Vec<ContentType>,
    pub tone: Option<String>,
    pub target_audience: Option<String>,
    pub include_hashtags: bool,
    pub include_emojis: bool,
    pub language: String,
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default)]
    pub cost_usd: Option<f64>,
}

/// Output of the generation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub outputs: GeneratedContent,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait AiOrchestrator: Send + Sync {
    /// Fetch and analyze the source
    async fn extract_content(&self, url: &str, source_type: SourceType) -> Result<ExtractedContent>;

    /// Produce one item per requested content type
    async fn generate_content(
        &self,
        extracted: &ExtractedContent,
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;

    /// Human-readable name used in logs and /health
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    url: &'a str,
    source_type: SourceType,
}

#[derive(Serialize)]
struct GenerateRequestBody<'a> {
    content: &'a ExtractedContent,
    #[serde(flatten)]
    options: &'a GenerationOptions,
}

/// JSON-over-HTTP client for a remote orchestration service
///
/// POSTs to `{base_url}/extract` and `{base_url}/generate`.
pub struct HttpOrchestrator {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOrchestrator {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .with_context(|| format!("Invalid orchestrator base URL: {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("Orchestrator base URL must be http(s): {}", base_url));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(url = %url, "Calling orchestrator");

        let response = request
            .send()
            .await
            .with_context(|| format!("Orchestrator request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Orchestrator {} returned {}: {}",
                path,
                status.as_u16(),
                detail.chars().take(500).collect::<String>()
            ));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse orchestrator {} response", path))
    }
}

#[async_trait]
impl AiOrchestrator for HttpOrchestrator {
    async fn extract_content(&self, url: &str, source_type: SourceType) -> Result<ExtractedContent> {
        self.post_json("extract", &ExtractRequest { url, source_type })
            .await
    }

    async fn generate_content(
        &self,
        extracted: &ExtractedContent,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        self.post_json(
            "generate",
            &GenerateRequestBody {
                content: extracted,
                options,
            },
        )
        .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Stand-in used when no orchestrator is configured; every call fails
pub struct UnconfiguredOrchestrator;

#[async_trait]
impl AiOrchestrator for UnconfiguredOrchestrator {
    async fn extract_content(&self, _url: &str, _source_type: SourceType) -> Result<ExtractedContent> {
        Err(anyhow!(
            "No AI orchestrator configured (set orchestrator.base_url or CONTENTFLOW_ORCHESTRATOR_URL)"
        ))
    }

    async fn generate_content(
        &self,
        _extracted: &ExtractedContent,
        _options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        Err(anyhow!("No AI orchestrator configured"))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}
