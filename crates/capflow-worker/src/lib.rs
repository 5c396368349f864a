//! Subtitle pipeline worker.
//!
//! This crate provides:
//! - Pipeline executor with compare-and-set stage writes
//! - Stage operation contracts and the HTTP media-service client
//! - Local SRT subtitle generation
//! - Content-addressed media cache service
//! - Webhook notifications
//! - Job service used by the HTTP layer

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod media_cache;
pub mod media_client;
pub mod metrics;
pub mod notifier;
pub mod ops;
pub mod runner;
pub mod service;
pub mod subtitles;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{PipelineExecutor, RunOutcome, Stage, StageOps};
pub use logging::JobLogger;
pub use media_cache::{CachedMedia, MediaCacheService};
pub use media_client::MediaServiceClient;
pub use notifier::{NoopNotifier, Notifier, WebhookNotifier};
pub use ops::{MediaOps, MediaSource, SpeechToText, SubtitleDocument, SubtitleGenerator, TranscriptSegment, Translator};
pub use runner::DetachedRunner;
pub use service::{BulkItem, BulkOutcome, JobService, JobUpdate, RetryOutcome};
pub use subtitles::SrtSubtitleGenerator;
