//! Access token cache for Google APIs.
//!
//! Tokens are refreshed a minute before expiry under a write lock so that
//! concurrent callers trigger a single refresh. If a refresh fails while the
//! cached token is still usable, the cached token is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot convert.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore access.
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

/// Thread-safe token cache for a single OAuth scope.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    scope: &'static str,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>, scope: &'static str) -> Self {
        Self {
            auth,
            scope,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        self.refresh(&mut cache).await
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match self.auth.token(&[self.scope]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let now = Utc::now();
                let expiry = token.expires_at();
                let expires_at = if expiry > now {
                    (expiry - now)
                        .to_std()
                        .map(|ttl| Instant::now() + ttl)
                        .unwrap_or_else(|_| Instant::now() + TOKEN_DEFAULT_TTL)
                } else {
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!(scope = self.scope, "Refreshed access token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref().filter(|c| c.is_usable()) {
                    warn!("Token refresh failed, using existing token: {}", e);
                    return Ok(cached.access_token.clone());
                }
                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness() {
        let fresh = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(fresh.is_fresh());
        assert!(fresh.is_usable());

        let stale = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!stale.is_fresh());
        assert!(stale.is_usable());
    }
}
