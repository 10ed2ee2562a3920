//! Enqueue seam used by the trigger.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{QueueError, QueueResult};
use crate::job::GenerateVideoJob;
use crate::queue::JobQueue;

/// Something that accepts new generation jobs.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Enqueue a job, returning the message ID.
    ///
    /// Fails with [`QueueError::Duplicate`] if the same record is already queued.
    async fn publish(&self, job: GenerateVideoJob) -> QueueResult<String>;
}

#[async_trait]
impl JobPublisher for JobQueue {
    async fn publish(&self, job: GenerateVideoJob) -> QueueResult<String> {
        self.enqueue(job).await
    }
}

/// Publisher that records jobs in memory.
#[derive(Default)]
pub struct InMemoryPublisher {
    jobs: Mutex<Vec<GenerateVideoJob>>,
    fail_with: Option<String>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher whose every publish fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub async fn published(&self) -> Vec<GenerateVideoJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobPublisher for InMemoryPublisher {
    async fn publish(&self, job: GenerateVideoJob) -> QueueResult<String> {
        if let Some(message) = &self.fail_with {
            return Err(QueueError::enqueue_failed(message.clone()));
        }

        let mut jobs = self.jobs.lock().await;
        let key = job.idempotency_key();
        if jobs.iter().any(|j| j.idempotency_key() == key) {
            return Err(QueueError::Duplicate(key));
        }
        jobs.push(job);
        Ok(format!("{}-0", jobs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchain_models::JobId;

    #[tokio::test]
    async fn test_in_memory_rejects_duplicates() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish(GenerateVideoJob::new(JobId::from("a"), "u"))
            .await
            .unwrap();
        let err = publisher
            .publish(GenerateVideoJob::new(JobId::from("a"), "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Duplicate(_)));
        assert_eq!(publisher.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_publisher() {
        let publisher = InMemoryPublisher::failing("redis down");
        assert!(publisher
            .publish(GenerateVideoJob::new(JobId::from("a"), "u"))
            .await
            .is_err());
    }
}
