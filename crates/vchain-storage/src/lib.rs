//! Bucket storage for the video pipeline.
//!
//! This crate provides:
//! - An S3-compatible bucket client (GCS interoperability endpoint)
//! - The `BlobStore` trait used by the pipeline, plus an in-memory store
//! - Object key layout for segments, extracted frames and final output
//! - Presigned (time-limited) download URLs

pub mod client;
pub mod error;
pub mod layout;
pub mod memory;
pub mod store;

pub use client::{BucketClient, ObjectInfo, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBlobStore;
pub use store::BlobStore;
