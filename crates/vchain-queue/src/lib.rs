//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with duplicate suppression
//! - Worker consumption with retry/DLQ and reclaiming of stalled messages
//! - Delayed re-delivery of suspended jobs through a sorted set

pub mod error;
pub mod job;
pub mod publisher;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::GenerateVideoJob;
pub use publisher::{InMemoryPublisher, JobPublisher};
pub use queue::{JobQueue, QueueConfig};
