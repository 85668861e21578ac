//! Access tokens for Firestore requests.
//!
//! Tokens from a provider are cached until shortly before they expire. Refreshes
//! happen under a write lock so concurrent callers share one refresh, and an
//! existing token that is still usable is kept when a refresh fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the provider's expiry cannot be converted.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore/Datastore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

enum Source {
    Provider {
        auth: Arc<dyn TokenProvider>,
        cache: RwLock<Option<CachedToken>>,
    },
    /// Fixed bearer token, used against the emulator.
    Static(String),
}

/// Hands out bearer tokens for Firestore requests.
pub struct TokenCache {
    source: Source,
}

impl TokenCache {
    /// Cache tokens from a gcp_auth provider.
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            source: Source::Provider {
                auth,
                cache: RwLock::new(None),
            },
        }
    }

    /// Always return the same token.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Static(token.into()),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if let Source::Provider { cache, .. } = &self.source {
            *cache.write().await = None;
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        let (auth, cache) = match &self.source {
            Source::Static(token) => return Ok(token.clone()),
            Source::Provider { auth, cache } => (auth, cache),
        };

        if let Some(cached) = cache.read().await.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        let mut slot = cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        match auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let now = Utc::now();
                let expires_at = match (token.expires_at() - now).to_std() {
                    Ok(ttl) => Instant::now() + ttl,
                    Err(_) if token.expires_at() <= now => Instant::now(),
                    Err(_) => Instant::now() + TOKEN_DEFAULT_TTL,
                };
                let access_token = token.as_str().to_string();
                *slot = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore access token");
                Ok(access_token)
            }
            Err(e) => match slot.as_ref().filter(|c| c.is_usable()) {
                Some(cached) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_token() {
        let cache = TokenCache::fixed("owner");
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "owner");
    }

    #[test]
    fn test_cached_token_margin() {
        let nearly_expired = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!nearly_expired.is_fresh());
        assert!(nearly_expired.is_usable());

        let fresh = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(fresh.is_fresh());
    }
}
