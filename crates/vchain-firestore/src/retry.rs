//! Retry with exponential backoff and jitter for Firestore calls.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_retry;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (ms).
    pub base_delay_ms: u64,
    /// Maximum delay cap (ms).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_or("FIRESTORE_MAX_RETRIES", defaults.max_retries),
            base_delay_ms: env_or("FIRESTORE_RETRY_BASE_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("FIRESTORE_RETRY_MAX_MS", defaults.max_delay_ms),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Execute an async operation, retrying transient failures.
///
/// Retries network errors, 429 (honoring the server delay) and 5xx.
/// Everything else is returned immediately.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = FirestoreResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let span = info_span!("firestore_retry", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore operation failed, retrying: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| FirestoreError::request_failed("retry budget exhausted")))
}

/// Exponential backoff with full jitter, floored at the base delay.
fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after);
    }

    let capped = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_delay_ms);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let jittered = capped.saturating_mul((nanos % 1000) as u64) / 1000;

    Duration::from_millis(jittered.max(config.base_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_delay_honors_retry_after() {
        let delay = calculate_delay(&RetryConfig::default(), 0, Some(2000));
        assert_eq!(delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_capped() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        };
        assert!(calculate_delay(&config, 10, None).as_millis() <= 2000);
        assert!(calculate_delay(&config, 0, None).as_millis() >= 1000);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FirestoreError::ServerError(503, "unavailable".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&fast_config(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FirestoreError::not_found("video_jobs/x"))
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
