//! Job record store.
//!
//! This crate provides:
//! - Store contracts for jobs, queues, media cache entries, plans and webhooks
//! - Firestore REST implementation (token cache, retry with jitter, metrics)
//! - Compare-and-set status transitions over document update times
//! - In-memory implementation for tests and local runs

pub mod account_repo;
pub mod client;
pub mod convert;
pub mod error;
pub mod job_repo;
pub mod media_cache_repo;
pub mod memory;
pub mod metrics;
pub mod queue_repo;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

#[cfg(test)]
mod client_tests;

pub use account_repo::AccountRepository;
pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::JobRepository;
pub use media_cache_repo::MediaCacheRepository;
pub use memory::MemoryStore;
pub use queue_repo::QueueRepository;
pub use retry::RetryConfig;
pub use store::{JobStore, MediaCacheStore, PlanStore, QueueStore, Stores, Transition, WebhookStore};
pub use types::{Document, Value};
