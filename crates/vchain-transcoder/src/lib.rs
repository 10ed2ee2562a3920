//! Client for the Transcoder API.
//!
//! This crate provides:
//! - Single-frame sprite-sheet jobs used to grab a segment's last frame
//! - Ordered concatenation jobs that stitch segments into one MP4
//! - Job polling with provider error details

pub mod client;
pub mod error;
pub mod provider;
pub mod types;

pub use client::{TranscoderClient, TranscoderConfig};
pub use error::{TranscoderError, TranscoderResult};
pub use provider::TranscodingProvider;
pub use types::{
    ConcatenationRequest, ExtractionRequest, JobPoll, JobState, TranscoderJobHandle,
};
