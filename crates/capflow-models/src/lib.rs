//! Shared data models for the capflow subtitle pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their status graph and closed patch type
//! - Source classification and edit decisions (cuts, sequences)
//! - Subtitle styles and caption documents
//! - Queues, plan limits and media cache entries

pub mod edit;
pub mod error;
pub mod filter;
pub mod job;
pub mod job_status;
pub mod media_cache;
pub mod patch;
pub mod plan;
pub mod queue;
pub mod source;
pub mod subtitle;
pub mod webhook;

// Re-export common types
pub use edit::{
    map_trimmed_to_original, Sequence, SequenceClip, SequenceData, SequenceLayer, SequenceLayerType, VideoCut,
};
pub use error::{ModelError, ModelResult};
pub use filter::{JobFilter, JobPage, StatusCounts, StatusFilter, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use job::{Job, JobCreateRequest, JobId};
pub use job_status::{JobStatus, JobStep};
pub use media_cache::{MediaCacheEntry, MediaCacheKind};
pub use patch::JobPatch;
pub use plan::{PlanLimits, PlanTier};
pub use queue::{Queue, QueueId, QueueStatus};
pub use source::SourceType;
pub use subtitle::{CaptionData, SubtitleConfig, SubtitleCue, SubtitlePosition, WordTiming};
pub use webhook::{WebhookEvent, WebhookSubscription};
