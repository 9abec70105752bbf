//! Request schemas and their validation

use serde::Deserialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::{ContentType, SourceMetadata, SourceType};

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_TONE_LENGTH: usize = 64;
pub const MAX_AUDIENCE_LENGTH: usize = 256;
pub const MAX_INSTRUCTIONS_LENGTH: usize = 2000;
pub const MAX_BATCH_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Request rejected before anything is persisted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// POST /api/v1/generate
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateRequest {
    pub source_url: String,
    pub source_type: SourceType,
    #[serde(default = "default_content_types")]
    pub content_types: Vec<ContentType>,
    #[serde(default = "default_tone")]
    pub tone: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default = "default_true")]
    pub include_hashtags: bool,
    #[serde(default)]
    pub include_emojis: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

fn default_content_types() -> Vec<ContentType> {
    vec![ContentType::LinkedinCarousel, ContentType::TwitterThread]
}

fn default_tone() -> Option<String> {
    Some("professional".to_string())
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

impl GenerateRequest {
    /// Minimal request with every optional field at its default
    pub fn new(source_url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            source_url: source_url.into(),
            source_type,
            content_types: default_content_types(),
            tone: default_tone(),
            target_audience: None,
            include_hashtags: true,
            include_emojis: false,
            language: default_language(),
            custom_instructions: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_source_url(&self.source_url)?;

        if self.content_types.is_empty() {
            return Err(ValidationError::new("At least one content type is required"));
        }

        check_length("tone", self.tone.as_deref(), MAX_TONE_LENGTH)?;
        check_length("target_audience", self.target_audience.as_deref(), MAX_AUDIENCE_LENGTH)?;
        check_length(
            "custom_instructions",
            self.custom_instructions.as_deref(),
            MAX_INSTRUCTIONS_LENGTH,
        )?;

        let lang = self.language.as_str();
        if lang.len() != 2 || !lang.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ValidationError::new(format!(
                "Language must be a two-letter ISO 639-1 code, got \"{}\"",
                self.language
            )));
        }

        Ok(())
    }

    /// Requested content types with duplicates removed, order kept
    pub fn unique_content_types(&self) -> Vec<ContentType> {
        let mut seen = Vec::with_capacity(self.content_types.len());
        for ct in &self.content_types {
            if !seen.contains(ct) {
                seen.push(*ct);
            }
        }
        seen
    }

    pub fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            tone: self.tone.clone(),
            target_audience: self.target_audience.clone(),
            include_hashtags: self.include_hashtags,
            include_emojis: self.include_emojis,
            language: Some(self.language.clone()),
            custom_instructions: self.custom_instructions.clone(),
        }
    }
}

/// http(s) URL with a host, bounded length
pub fn validate_source_url(raw: &str) -> Result<(), ValidationError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(ValidationError::new(format!(
            "Source URL exceeds {} characters",
            MAX_URL_LENGTH
        )));
    }
    let url = Url::parse(raw)
        .map_err(|e| ValidationError::new(format!("Invalid source URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::new(
            "Source URL must start with http:// or https://",
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::new("Source URL must include a host"));
    }
    Ok(())
}

fn check_length(field: &str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::new(format!(
            "{} exceeds {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

/// POST /api/v1/generate/batch
#[derive(Debug, Clone, Deserialize)]
pub struct BatchGenerateRequest {
    pub urls: Vec<String>,
    pub source_type: SourceType,
    #[serde(default = "default_batch_content_types")]
    pub content_types: Vec<ContentType>,
    #[serde(default = "default_tone")]
    pub tone: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default = "default_true")]
    pub include_hashtags: bool,
}

fn default_batch_content_types() -> Vec<ContentType> {
    vec![ContentType::LinkedinCarousel]
}

impl BatchGenerateRequest {
    /// One validated single-source request per URL
    pub fn into_requests(self) -> Result<Vec<GenerateRequest>, ValidationError> {
        if self.urls.is_empty() {
            return Err(ValidationError::new("At least one URL is required"));
        }
        if self.urls.len() > MAX_BATCH_SIZE {
            return Err(ValidationError::new(format!(
                "A batch may contain at most {} URLs",
                MAX_BATCH_SIZE
            )));
        }

        self.urls
            .iter()
            .map(|url| {
                let request = GenerateRequest {
                    source_url: url.clone(),
                    source_type: self.source_type,
                    content_types: self.content_types.clone(),
                    tone: self.tone.clone(),
                    target_audience: self.target_audience.clone(),
                    include_hashtags: self.include_hashtags,
                    include_emojis: false,
                    language: default_language(),
                    custom_instructions: None,
                };
                request.validate()?;
                Ok(request)
            })
            .collect()
    }
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
        }
    }
}

/// POST /api/v1/contents/{id}/export
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    /// Redundant with the path; checked for consistency when present
    #[serde(default)]
    pub content_id: Option<Uuid>,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

/// Sort column for content listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// GET /api/v1/contents query string
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_limit() -> i64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.skip < 0 {
            return Err(ValidationError::new("skip must be >= 0"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(ValidationError::new(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}
