//! Worker error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use vchain_models::ValidationError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation request rejected for segment {}: {message}", .segment + 1)]
    ProviderTrigger { segment: usize, message: String },

    #[error("Segment {} generation timed out after {attempts} polls", .segment + 1)]
    GenerationTimeout { segment: usize, attempts: u32 },

    #[error("Segment {} generation failed: {message}", .segment + 1)]
    GenerationFailed { segment: usize, message: String },

    #[error("Unrecognized response format: {0}")]
    UnrecognizedResponseFormat(String),

    #[error("Frame extraction timed out after {attempts} polls")]
    ExtractionTimeout { attempts: u32 },

    #[error("Frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Stitching failed: {0}")]
    StitchFailed(String),

    #[error("Stitching failed: timed out after {attempts} polls")]
    StitchTimeout { attempts: u32 },

    #[error("Suspended until {resume_at}")]
    Suspended { resume_at: DateTime<Utc> },

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] vchain_firestore::FirestoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] vchain_storage::StorageError),

    #[error("Generation provider error: {0}")]
    Veo(#[from] vchain_veo::VeoError),

    #[error("Transcoder error: {0}")]
    Transcoder(#[from] vchain_transcoder::TranscoderError),

    #[error("Queue error: {0}")]
    Queue(#[from] vchain_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn stitch_failed(msg: impl Into<String>) -> Self {
        Self::StitchFailed(msg.into())
    }

    /// Whether the queue should re-deliver the job rather than fail it.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Veo(e) => e.is_retryable(),
            WorkerError::Transcoder(e) => e.is_retryable(),
            WorkerError::Queue(_) => true,
            _ => false,
        }
    }

    /// Whether this is a durable-sleep hand-off rather than a failure.
    pub fn is_suspension(&self) -> bool {
        matches!(self, WorkerError::Suspended { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchain_firestore::FirestoreError;

    #[test]
    fn test_retryable_classification() {
        assert!(WorkerError::Firestore(FirestoreError::ServerError(503, "x".into())).is_retryable());
        assert!(!WorkerError::Firestore(FirestoreError::PermissionDenied("x".into())).is_retryable());
        assert!(!WorkerError::GenerationTimeout { segment: 0, attempts: 60 }.is_retryable());
        assert!(!WorkerError::stitch_failed("bad input").is_retryable());
    }

    #[test]
    fn test_stitch_timeout_message() {
        let msg = WorkerError::StitchTimeout { attempts: 60 }.to_string();
        assert!(msg.starts_with("Stitching failed"));
    }

    #[test]
    fn test_validation_from() {
        let err: WorkerError = ValidationError::EmptyPrompts.into();
        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(!err.is_suspension());
    }
}
