//! Source type classification.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where a job's media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Arbitrary external URL
    #[default]
    Url,
    /// File uploaded to our own storage
    Upload,
    Youtube,
    /// Multi-asset edit sequence
    Sequence,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::Upload => "upload",
            SourceType::Youtube => "youtube",
            SourceType::Sequence => "sequence",
        }
    }

    /// Classify a source URL by host and path.
    ///
    /// Unparseable input falls back to [`SourceType::Url`].
    pub fn classify(url: &str) -> Self {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return SourceType::Url,
        };
        let host = parsed.host_str().unwrap_or_default().to_lowercase();

        if host.contains("youtube.com") || host.contains("youtu.be") || host.ends_with("youtube-nocookie.com") {
            return SourceType::Youtube;
        }

        if host.contains("supabase.co") || host.contains("supabase.in") || parsed.path().contains("/storage/") {
            return SourceType::Upload;
        }

        SourceType::Url
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
