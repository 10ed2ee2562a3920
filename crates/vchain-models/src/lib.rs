//! Shared data models for the VChain video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Long-form video jobs and their status lifecycle
//! - Generation options and the aspect ratio to resolution mapping
//! - Inbound request validation
//! - Storage URI helpers

pub mod job;
pub mod options;
pub mod request;
pub mod uri;

// Re-export common types
pub use job::{
    progress_percent, segment_id, JobId, JobStatus, JobUpdate, OutputMetadata, VideoJob,
    VideoOutput, DEFAULT_ORGANIZATION_ID, SEGMENT_DURATION_SECS,
};
pub use options::{AspectRatio, AspectRatioParseError, GenerationOptions, Resolution};
pub use request::{validate_start_image, LongFormRequest, ValidationError};
pub use uri::to_gcs_uri;
