//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the media service (extraction, STT, translation, rendering)
    pub media_service_url: String,
    /// Per-request timeout for media service calls
    pub media_service_timeout: Duration,
    /// Locale subtitles are translated into
    pub target_locale: String,
    /// Storage prefix for delivered results
    pub results_prefix: String,
    /// Lifetime of signed URLs handed to stage operations
    pub signed_url_ttl: Duration,
    /// Per-delivery timeout for webhook calls
    pub webhook_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            media_service_url: "http://localhost:8081".to_string(),
            media_service_timeout: Duration::from_secs(600),
            target_locale: "ko".to_string(),
            results_prefix: "results".to_string(),
            signed_url_ttl: Duration::from_secs(3600),
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            media_service_url: std::env::var("MEDIA_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.media_service_url),
            media_service_timeout: Duration::from_secs(
                std::env::var("MEDIA_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            target_locale: std::env::var("TARGET_LOCALE").unwrap_or(defaults.target_locale),
            results_prefix: std::env::var("RESULTS_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.results_prefix),
            signed_url_ttl: Duration::from_secs(
                std::env::var("SIGNED_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            webhook_timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}
