//! Client for Veo video generation.
//!
//! This crate provides a client for the Generative Language API's
//! long-running `predictLongRunning` operations:
//! - Starting a generation and returning its operation handle
//! - Polling an operation until it reports `done`
//! - Extracting a playable reference from the heterogeneous response shapes
//! - Downloading provider-hosted video files

pub mod client;
pub mod error;
pub mod provider;
pub mod types;

pub use client::{VeoClient, VeoConfig};
pub use error::{VeoError, VeoResult};
pub use provider::GenerationProvider;
pub use types::{
    parse_generated_video, GeneratedVideo, GenerationRequest, OperationError, OperationHandle,
    OperationStatus,
};
