//! In-memory stores for local development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use vchain_models::{JobId, JobUpdate, VideoJob};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{JobStore, StepStore};

/// Job store kept in process memory.
///
/// Every successful write also appends a snapshot of the resulting record
/// to a history so callers can inspect the sequence of observed states.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, VideoJob>>,
    history: RwLock<Vec<VideoJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots of a job after each write, oldest first.
    pub async fn history(&self, id: &JobId) -> Vec<VideoJob> {
        self.history
            .read()
            .await
            .iter()
            .filter(|j| &j.id == id)
            .cloned()
            .collect()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(FirestoreError::AlreadyExists(format!("video_jobs/{}", job.id)));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        self.history.write().await.push(job.clone());
        Ok(())
    }

    async fn merge(&self, id: &JobId, update: &JobUpdate) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| FirestoreError::not_found(format!("video_jobs/{}", id)))?;
        update.apply_to(job);
        self.history.write().await.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<VideoJob> {
        self.jobs
            .read()
            .await
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| FirestoreError::not_found(format!("video_jobs/{}", id)))
    }
}

/// Step result store kept in process memory.
#[derive(Default)]
pub struct InMemoryStepStore {
    steps: RwLock<HashMap<(String, String), JsonValue>>,
}

impl InMemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the steps recorded for a job, sorted.
    pub async fn step_names(&self, job_id: &JobId) -> Vec<String> {
        let mut names: Vec<String> = self
            .steps
            .read()
            .await
            .keys()
            .filter(|(job, _)| job == job_id.as_str())
            .map(|(_, step)| step.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StepStore for InMemoryStepStore {
    async fn load(&self, job_id: &JobId, step: &str) -> FirestoreResult<Option<JsonValue>> {
        let key = (job_id.as_str().to_string(), step.to_string());
        Ok(self.steps.read().await.get(&key).cloned())
    }

    async fn save(&self, job_id: &JobId, step: &str, output: &JsonValue) -> FirestoreResult<()> {
        let key = (job_id.as_str().to_string(), step.to_string());
        self.steps.write().await.insert(key, output.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchain_models::{JobStatus, LongFormRequest};

    fn job(id: &str) -> VideoJob {
        VideoJob::queued(&LongFormRequest {
            job_id: id.to_string(),
            owner_id: "owner".to_string(),
            prompts: vec!["p".to_string()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = InMemoryJobStore::new();
        store.create(&job("a")).await.unwrap();
        let err = store.create(&job("a")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_merge_missing_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store
            .merge(&JobId::from("nope"), &JobUpdate::new().status(JobStatus::Processing))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_history_records_each_write() {
        let store = InMemoryJobStore::new();
        let id = JobId::from("a");
        store.create(&job("a")).await.unwrap();
        store
            .merge(&id, &JobUpdate::new().status(JobStatus::Processing))
            .await
            .unwrap();

        let history = store.history(&id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_steps_are_scoped_by_job() {
        let steps = InMemoryStepStore::new();
        let a = JobId::from("a");
        let b = JobId::from("b");
        steps.save(&a, "s1", &serde_json::json!(1)).await.unwrap();

        assert_eq!(steps.load(&a, "s1").await.unwrap(), Some(serde_json::json!(1)));
        assert_eq!(steps.load(&b, "s1").await.unwrap(), None);
        assert_eq!(steps.step_names(&a).await, vec!["s1"]);
    }
}
