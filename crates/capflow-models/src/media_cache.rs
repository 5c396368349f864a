//! Content-addressed media cache entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of cached intermediate artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaCacheKind {
    /// Source audio reduced to the kept segments
    TrimmedAudio,
    /// Rendered multi-asset sequence
    SequenceVideo,
}

impl MediaCacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCacheKind::TrimmedAudio => "trimmed_audio",
            MediaCacheKind::SequenceVideo => "sequence_video",
        }
    }

    /// Storage directory under `cache/`.
    pub fn directory(&self) -> &'static str {
        match self {
            MediaCacheKind::TrimmedAudio => "trimmed",
            MediaCacheKind::SequenceVideo => "sequence",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaCacheKind::TrimmedAudio => "mp3",
            MediaCacheKind::SequenceVideo => "mp4",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaCacheKind::TrimmedAudio => "audio/mpeg",
            MediaCacheKind::SequenceVideo => "video/mp4",
        }
    }
}

impl std::fmt::Display for MediaCacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A previously produced artifact, unique on (kind, hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaCacheEntry {
    pub kind: MediaCacheKind,
    pub hash: String,
    pub storage_key: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl MediaCacheEntry {
    pub fn new(kind: MediaCacheKind, hash: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            kind,
            hash: hash.into(),
            storage_key: storage_key.into(),
            mime_type: Some(kind.mime_type().to_string()),
            duration_ms: None,
            size_bytes: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_size(mut self, size_bytes: Option<u64>) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_duration(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Document id used by stores keyed on (kind, hash).
    pub fn document_id(kind: MediaCacheKind, hash: &str) -> String {
        format!("{}_{}", kind.as_str(), hash)
    }
}
