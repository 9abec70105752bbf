//! Services: pipeline, session registry, orchestrator client, export

pub mod export;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;

pub use orchestrator::{
    AiOrchestrator, ExtractedContent, GenerationOptions, GenerationResult, HttpOrchestrator,
    TokenUsage, UnconfiguredOrchestrator,
};
pub use pipeline::{CancelOutcome, JobRunner, RunnerConfig, SubmittedJob};
pub use registry::{ConnectionId, SessionRegistry};
