//! API configuration.

use std::time::Duration;

/// Where job, queue and cache records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process memory; records are lost on restart
    Memory,
}

impl StoreBackend {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            _ => StoreBackend::Firestore,
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    pub store_backend: StoreBackend,
    /// A job in a stage status untouched for this long counts as stalled
    pub stale_job_threshold: Duration,
    pub stale_job_scan_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 2 * 1024 * 1024,
            environment: "development".to_string(),
            store_backend: StoreBackend::Firestore,
            stale_job_threshold: Duration::from_secs(30 * 60),
            stale_job_scan_interval: Duration::from_secs(60),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            store_backend: std::env::var("STORE_BACKEND")
                .map(|s| StoreBackend::parse(&s))
                .unwrap_or(defaults.store_backend),
            stale_job_threshold: Duration::from_secs(
                std::env::var("STALE_JOB_THRESHOLD_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30 * 60),
            ),
            stale_job_scan_interval: Duration::from_secs(
                std::env::var("STALE_JOB_SCAN_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
