//! Content-addressed keys for cached intermediate media.
//!
//! A key is a pure function of the normalized computation parameters:
//! ordering noise in how cuts or clips were expressed never changes it.

use capflow_models::{MediaCacheKind, SequenceClip, VideoCut};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex characters of SHA-256 kept in a cache hash.
pub const HASH_LENGTH: usize = 12;

/// Parameters of a cacheable computation.
#[derive(Debug, Clone, Copy)]
pub enum CacheParams<'a> {
    /// Source audio reduced to the kept segments.
    TrimmedAudio {
        source_fingerprint: &'a str,
        cuts: &'a [VideoCut],
    },
    /// Clips of a sequence rendered back to back.
    SequenceVideo { clips: &'a [SequenceClip] },
}

impl CacheParams<'_> {
    pub fn kind(&self) -> MediaCacheKind {
        match self {
            CacheParams::TrimmedAudio { .. } => MediaCacheKind::TrimmedAudio,
            CacheParams::SequenceVideo { .. } => MediaCacheKind::SequenceVideo,
        }
    }

    /// Canonical encoding of the semantic parameters.
    fn canonical_payload(&self) -> String {
        let payload = match self {
            CacheParams::TrimmedAudio {
                source_fingerprint,
                cuts,
            } => {
                let mut cuts: Vec<CutPayload> = cuts
                    .iter()
                    .map(|c| CutPayload {
                        start: c.start,
                        end: c.end,
                    })
                    .collect();
                cuts.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
                serde_json::to_string(&TrimmedPayload {
                    source_fingerprint: *source_fingerprint,
                    cuts,
                })
            }
            CacheParams::SequenceVideo { clips } => {
                let mut sorted: Vec<&SequenceClip> = clips.iter().collect();
                sorted.sort_by_key(|c| c.order);
                let clips = sorted
                    .into_iter()
                    .map(|c| ClipPayload {
                        asset_id: &c.asset_id,
                        start_time: c.start_time,
                        end_time: c.end_time,
                        order: c.order,
                        speed: c.speed.unwrap_or(1.0),
                    })
                    .collect();
                serde_json::to_string(&SequencePayload { clips })
            }
        };
        // Plain structs of strings and numbers always serialize
        payload.unwrap_or_default()
    }
}

// Struct field order fixes the key order of the encoding.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrimmedPayload<'a> {
    source_fingerprint: &'a str,
    cuts: Vec<CutPayload>,
}

#[derive(Serialize)]
struct CutPayload {
    start: f64,
    end: f64,
}

#[derive(Serialize)]
struct SequencePayload<'a> {
    clips: Vec<ClipPayload<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClipPayload<'a> {
    asset_id: &'a str,
    start_time: f64,
    end_time: f64,
    order: i64,
    speed: f64,
}

/// Hash and storage location of a cacheable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub kind: MediaCacheKind,
    pub hash: String,
    pub storage_key: String,
}

impl CacheKey {
    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

/// Build the cache key for a computation.
///
/// The normalized payload is serialized as JSON and hashed with SHA-256.
pub fn build_cache_key(params: CacheParams<'_>) -> CacheKey {
    let kind = params.kind();
    let payload = params.canonical_payload();
    let digest = Sha256::digest(payload.as_bytes());
    let hash: String = format!("{:x}", digest).chars().take(HASH_LENGTH).collect();
    let storage_key = format!("cache/{}/{}.{}", kind.directory(), hash, kind.extension());

    CacheKey {
        kind,
        hash,
        storage_key,
    }
}

pub fn trimmed_audio_cache_key(source_fingerprint: &str, cuts: &[VideoCut]) -> CacheKey {
    build_cache_key(CacheParams::TrimmedAudio {
        source_fingerprint,
        cuts,
    })
}

pub fn sequence_cache_key(clips: &[SequenceClip]) -> CacheKey {
    build_cache_key(CacheParams::SequenceVideo { clips })
}

/// Identity of the media a trim is applied to.
///
/// Assets are preferred, then a rendered sequence, then the raw url.
pub fn source_fingerprint(asset_id: Option<&str>, sequence_hash: Option<&str>, url: Option<&str>) -> Option<String> {
    if let Some(asset) = asset_id.filter(|s| !s.is_empty()) {
        return Some(format!("asset:{}", asset));
    }
    if let Some(hash) = sequence_hash.filter(|s| !s.is_empty()) {
        return Some(format!("sequence:{}", hash));
    }
    url.filter(|s| !s.is_empty()).map(|u| format!("url:{}", u))
}
