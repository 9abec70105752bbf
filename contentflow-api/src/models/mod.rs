//! Domain models and API schemas

pub mod content;
pub mod embedding;
pub mod job;
pub mod requests;
pub mod responses;

pub use content::{Content, ContentType, GeneratedContent, GeneratedItem, SourceMetadata, SourceType};
pub use embedding::{content_hash, EmbeddingCacheEntry};
pub use job::{JobStatus, ProcessingJob, TransitionError};
pub use requests::{
    BatchGenerateRequest, ExportFormat, ExportRequest, GenerateRequest, ListQuery, SortField,
    SortOrder, ValidationError,
};
pub use responses::{
    BatchGenerateResponse, ContentListResponse, ContentResponse, ContentStatistics,
    ExportResponse, GenerateResponse, ProcessingJobResponse,
};
