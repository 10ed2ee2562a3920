//! Transcoder client error types.

use thiserror::Error;

pub type TranscoderResult<T> = Result<T, TranscoderError>;

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Transcoder request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranscoderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TranscoderError::Network(_) | TranscoderError::AuthError(_) => true,
            TranscoderError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let overloaded = TranscoderError::RequestFailed { status: 503, body: String::new() };
        let invalid = TranscoderError::RequestFailed { status: 400, body: String::new() };
        assert!(overloaded.is_retryable());
        assert!(!invalid.is_retryable());
        assert!(!TranscoderError::config_error("x").is_retryable());
    }
}
