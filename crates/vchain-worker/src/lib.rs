//! Long-form video generation worker.
//!
//! This crate provides:
//! - Memoized, crash-safe steps (`run` / `sleep`) over a durable step store
//! - Segment generation, last-frame continuity and stitching stages
//! - The job state machine driving a record from `queued` to a final state
//! - A queue executor with bounded concurrency, retries, DLQ and resumption

pub mod config;
pub mod context;
pub mod continuity;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod segment;
pub mod steps;
pub mod stitch;

pub use config::{PipelineConfig, WorkerConfig};
pub use context::PipelineContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{fail_job, run_pipeline, PipelineOutcome};
pub use steps::StepContext;
