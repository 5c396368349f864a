//! Content-addressed cache for expensive media transforms.
//!
//! Lookups and entry writes never fail a job: a broken lookup is a miss and
//! a broken upsert only costs a recomputation later. Racing computations of
//! the same key both upsert the same entry; the last write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use capflow_firestore::MediaCacheStore;
use capflow_models::MediaCacheEntry;
use capflow_storage::{CacheKey, ObjectStorage};

use crate::error::WorkerResult;
use crate::metrics::record_cache_lookup;
use crate::ops::RenderedArtifact;

/// A cached or freshly computed artifact, ready to hand to the next stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMedia {
    pub storage_key: String,
    pub url: String,
    pub hit: bool,
}

#[derive(Clone)]
pub struct MediaCacheService {
    entries: Arc<dyn MediaCacheStore>,
    storage: Arc<dyn ObjectStorage>,
    url_ttl: Duration,
}

impl MediaCacheService {
    pub fn new(entries: Arc<dyn MediaCacheStore>, storage: Arc<dyn ObjectStorage>, url_ttl: Duration) -> Self {
        Self {
            entries,
            storage,
            url_ttl,
        }
    }

    /// Stored entry for `key`, if any. Lookup failures read as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Option<MediaCacheEntry> {
        match self.entries.get(key.kind, &key.hash).await {
            Ok(Some(entry)) => {
                record_cache_lookup(key.kind, "hit");
                Some(entry)
            }
            Ok(None) => {
                record_cache_lookup(key.kind, "miss");
                None
            }
            Err(e) => {
                record_cache_lookup(key.kind, "error");
                warn!(kind = key.kind.as_str(), hash = %key.hash, error = %e, "Media cache lookup failed");
                None
            }
        }
    }

    /// Reuse the artifact for `key`, or run `compute` with the target storage
    /// key and record the result.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> WorkerResult<CachedMedia>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = WorkerResult<RenderedArtifact>>,
    {
        if let Some(entry) = self.lookup(key).await {
            match self.storage.exists(&entry.storage_key).await {
                Ok(true) => {
                    let url = self.storage.signed_url(&entry.storage_key, self.url_ttl).await?;
                    debug!(kind = key.kind.as_str(), hash = %key.hash, "Media cache hit");
                    return Ok(CachedMedia {
                        storage_key: entry.storage_key,
                        url,
                        hit: true,
                    });
                }
                Ok(false) => {
                    warn!(
                        kind = key.kind.as_str(),
                        hash = %key.hash,
                        storage_key = %entry.storage_key,
                        "Cached artifact missing from storage, recomputing"
                    );
                }
                Err(e) => {
                    warn!(
                        kind = key.kind.as_str(),
                        hash = %key.hash,
                        error = %e,
                        "Cached artifact unreadable, recomputing"
                    );
                }
            }
        }

        let artifact = compute(key.storage_key.clone()).await?;
        let entry = MediaCacheEntry::new(key.kind, key.hash.clone(), artifact.storage_key.clone())
            .with_size(artifact.size_bytes)
            .with_duration(artifact.duration_ms);
        if let Err(e) = self.entries.upsert(&entry).await {
            warn!(kind = key.kind.as_str(), hash = %key.hash, error = %e, "Failed to record media cache entry");
        } else {
            info!(kind = key.kind.as_str(), hash = %key.hash, "Media cache entry recorded");
        }

        let url = self.storage.signed_url(&artifact.storage_key, self.url_ttl).await?;
        Ok(CachedMedia {
            storage_key: artifact.storage_key,
            url,
            hit: false,
        })
    }
}
