//! Object storage for pipeline artifacts.
//!
//! This crate provides:
//! - The `ObjectStorage` contract (put, signed URL, remove)
//! - Cloudflare R2 implementation over the S3 API
//! - In-memory implementation for tests and local runs
//! - Content-addressed media cache keys

pub mod client;
pub mod error;
pub mod media_key;
pub mod memory;

pub use client::{ObjectStorage, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use media_key::{
    build_cache_key, sequence_cache_key, source_fingerprint, trimmed_audio_cache_key, CacheKey, CacheParams,
    HASH_LENGTH,
};
pub use memory::MemoryStorage;
