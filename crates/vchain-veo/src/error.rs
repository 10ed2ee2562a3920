//! Veo client error types.

use thiserror::Error;

pub type VeoResult<T> = Result<T, VeoError>;

#[derive(Debug, Error)]
pub enum VeoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Generation request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Provider returned no operation name")]
    MissingOperationName,

    #[error("Unrecognized generation response: {0}")]
    UnrecognizedResponse(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VeoError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether a later attempt may succeed.
    ///
    /// Rejections are retryable only when the provider was overloaded.
    pub fn is_retryable(&self) -> bool {
        match self {
            VeoError::Network(_) | VeoError::DownloadFailed(_) => true,
            VeoError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
