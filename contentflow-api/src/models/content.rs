//! Content record and its enumerations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of source the content was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Youtube,
    Podcast,
    Article,
    Transcript,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Youtube,
        SourceType::Podcast,
        SourceType::Article,
        SourceType::Transcript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "youtube",
            SourceType::Podcast => "podcast",
            SourceType::Article => "article",
            SourceType::Transcript => "transcript",
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown source type: {}", s))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of generated output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    LinkedinCarousel,
    TwitterThread,
    BlogPost,
    InstagramCaption,
    Newsletter,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::LinkedinCarousel,
        ContentType::TwitterThread,
        ContentType::BlogPost,
        ContentType::InstagramCaption,
        ContentType::Newsletter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::LinkedinCarousel => "linkedin_carousel",
            ContentType::TwitterThread => "twitter_thread",
            ContentType::BlogPost => "blog_post",
            ContentType::InstagramCaption => "instagram_caption",
            ContentType::Newsletter => "newsletter",
        }
    }

    /// Heading used in markdown exports
    pub fn display_name(&self) -> &'static str {
        match self {
            ContentType::LinkedinCarousel => "LinkedIn Carousel",
            ContentType::TwitterThread => "Twitter Thread",
            ContentType::BlogPost => "Blog Post",
            ContentType::InstagramCaption => "Instagram Caption",
            ContentType::Newsletter => "Newsletter",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown content type: {}", s))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    /// Filled from `body` when the generator leaves it out
    #[serde(default)]
    pub character_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_engagement: Option<f64>,
}

impl GeneratedItem {
    pub fn new(body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            title: None,
            character_count: body.chars().count(),
            body,
            hashtags: None,
            call_to_action: None,
            estimated_engagement: None,
        }
    }
}

/// content_type → generated item
pub type GeneratedContent = BTreeMap<ContentType, GeneratedItem>;

/// Style parameters captured at submission time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub include_hashtags: bool,
    #[serde(default)]
    pub include_emojis: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

/// Processed content and its generated outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub user_id: String,

    pub source_type: SourceType,
    pub source_url: String,
    pub source_title: Option<String>,
    pub source_metadata: SourceMetadata,

    /// Empty until extraction succeeds
    pub raw_text: String,
    pub cleaned_text: Option<String>,
    pub key_points: Vec<String>,
    pub summary: Option<String>,

    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,

    pub generated_content: GeneratedContent,

    pub processing_time_ms: Option<i64>,
    pub token_count_input: Option<i64>,
    pub token_count_output: Option<i64>,
    pub cost_usd: Option<f64>,

    pub is_public: bool,
    pub is_archived: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// New content with only source metadata filled in
    pub fn new(
        user_id: impl Into<String>,
        source_type: SourceType,
        source_url: impl Into<String>,
        source_metadata: SourceMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            source_type,
            source_url: source_url.into(),
            source_title: None,
            source_metadata,
            raw_text: String::new(),
            cleaned_text: None,
            key_points: Vec::new(),
            summary: None,
            embedding: None,
            embedding_model: None,
            generated_content: GeneratedContent::new(),
            processing_time_ms: None,
            token_count_input: None,
            token_count_output: None,
            cost_usd: None,
            is_public: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }
}
