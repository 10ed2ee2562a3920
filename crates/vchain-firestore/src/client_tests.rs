//! Error classification tests for the Firestore client.

use crate::error::FirestoreError;

#[test]
fn test_error_from_http_status_429() {
    let err = FirestoreError::from_http_status(429, "rate limited");
    assert!(matches!(err, FirestoreError::RateLimited(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_error_from_http_status_5xx() {
    for code in [500, 502, 503] {
        let err = FirestoreError::from_http_status(code, "server");
        assert!(matches!(err, FirestoreError::ServerError(c, _) if c == code));
        assert!(err.is_retryable());
    }
}

#[test]
fn test_error_from_http_status_4xx_not_retryable() {
    for code in [400, 403, 404, 409] {
        let err = FirestoreError::from_http_status(code, "client");
        assert!(!err.is_retryable(), "{} should not be retryable", code);
        assert_eq!(err.http_status(), Some(code));
    }
}

#[test]
fn test_not_found_and_conflict_helpers() {
    assert!(FirestoreError::from_http_status(404, "x").is_not_found());
    assert!(FirestoreError::from_http_status(409, "x").is_already_exists());
}

#[test]
fn test_retry_after_only_for_rate_limit() {
    assert_eq!(FirestoreError::RateLimited(1500).retry_after_ms(), Some(1500));
    assert_eq!(FirestoreError::request_failed("x").retry_after_ms(), None);
}
