//! Storage traits used by the pipeline.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use vchain_models::{JobId, JobUpdate, VideoJob};

use crate::error::FirestoreResult;

/// Durable job record store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a record. Fails with `AlreadyExists` on ID collision.
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()>;

    /// Merge the fields set in `update`, always bumping `updated_at`.
    /// Fails with `NotFound` if the record is absent.
    async fn merge(&self, id: &JobId, update: &JobUpdate) -> FirestoreResult<()>;

    /// Fetch a record. Fails with `NotFound` if absent.
    async fn get(&self, id: &JobId) -> FirestoreResult<VideoJob>;
}

/// Durable store of memoized step results, keyed by `(job_id, step_name)`.
#[async_trait]
pub trait StepStore: Send + Sync {
    async fn load(&self, job_id: &JobId, step: &str) -> FirestoreResult<Option<JsonValue>>;

    async fn save(&self, job_id: &JobId, step: &str, output: &JsonValue) -> FirestoreResult<()>;
}
