//! Firestore REST API client and job stores.
//!
//! This crate provides:
//! - Job record repository (`video_jobs` collection) with masked merges
//! - Step result repository (`video_jobs/{id}/steps` sub-collection)
//! - `JobStore` / `StepStore` traits with in-memory implementations
//! - Service account authentication via gcp_auth
//! - Retry with exponential backoff and request metrics

pub mod client;
pub mod error;
pub mod job_repo;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod step_repo;
pub mod store;
pub mod token_cache;
pub mod types;

#[cfg(test)]
mod client_tests;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::JobRepository;
pub use memory::{InMemoryJobStore, InMemoryStepStore};
pub use retry::RetryConfig;
pub use step_repo::StepRepository;
pub use store::{JobStore, StepStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
