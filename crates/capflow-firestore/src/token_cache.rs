//! Access token caching for Firestore requests.
//!
//! Tokens are refreshed ahead of expiry under a write lock so concurrent
//! callers share a single refresh. A still-usable token is kept when a
//! refresh fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

// =============================================================================
// Constants
// =============================================================================

/// Refresh this long before the token expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the provider reports no usable expiry.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

// =============================================================================
// Token Sources
// =============================================================================

/// Where bearer tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// Service account credentials
    Provider(Arc<dyn TokenProvider>),
    /// Fixed token, used against the emulator
    Static(String),
}

// =============================================================================
// Token Cache
// =============================================================================

/// Token plus the instant it stops being accepted.
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Valid beyond the refresh margin.
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    /// Not yet expired, even if a refresh is due.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Shared token cache with single-flight refresh.
pub struct TokenCache {
    source: TokenSource,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Create an empty cache over `source`.
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Current access token, refreshing if it is close to expiry.
    ///
    /// Readers take the read lock; only a stale token takes the write lock,
    /// and the freshness check is repeated under it.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        let provider = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Provider(provider) => provider,
        };

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        Self::refresh(provider.as_ref(), &mut cache).await
    }

    /// Fetch a new token into `cache`, falling back to the cached one while
    /// it is still usable.
    async fn refresh(provider: &dyn TokenProvider, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let now = Utc::now();
                let expires = token.expires_at();
                // An already expired token forces a refresh on the next call
                let ttl = if expires > now {
                    (expires - now).to_std().unwrap_or(TOKEN_DEFAULT_TTL)
                } else {
                    Duration::ZERO
                };

                let access_token = token.as_str().to_string();
                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed Firestore access token");
                Ok(access_token)
            }
            Err(e) => match cache.as_ref().filter(|c| c.is_usable()) {
                Some(cached) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                None => Err(FirestoreError::auth_error(format!("Failed to obtain auth token: {}", e))),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
