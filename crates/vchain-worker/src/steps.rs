//! Memoized durable steps.
//!
//! A step is identified by `(job_id, name)`. The first successful invocation
//! records its JSON-serialized result in the step store; every later
//! invocation returns the recorded result without running the body. Failed
//! bodies record nothing, so they run again on the next attempt.
//!
//! Durable sleeps are steps whose result is the wake-up instant.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use vchain_firestore::StepStore;
use vchain_models::JobId;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Step runner bound to one job.
#[derive(Clone)]
pub struct StepContext {
    job_id: JobId,
    store: Arc<dyn StepStore>,
    inline_sleep_max: Duration,
}

impl StepContext {
    pub fn new(job_id: JobId, store: Arc<dyn StepStore>, inline_sleep_max: Duration) -> Self {
        Self {
            job_id,
            store,
            inline_sleep_max,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Run `body` once per job; replays return the recorded value.
    pub async fn run<T, F, Fut>(&self, name: &str, body: F) -> WorkerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        if let Some(recorded) = self.store.load(&self.job_id, name).await? {
            debug!(job_id = %self.job_id, step = name, "Replaying recorded step");
            metrics::record_step(true);
            return Ok(serde_json::from_value(recorded)?);
        }

        let output = body().await?;
        self.store
            .save(&self.job_id, name, &serde_json::to_value(&output)?)
            .await?;

        debug!(job_id = %self.job_id, step = name, "Recorded step");
        metrics::record_step(false);
        Ok(output)
    }

    /// Durable sleep.
    ///
    /// Short remaining waits are awaited in place; longer ones return
    /// [`WorkerError::Suspended`] so the job can be re-delivered at the wake-up
    /// instant.
    pub async fn sleep(&self, name: &str, duration: Duration) -> WorkerResult<()> {
        let delta = chrono::Duration::from_std(duration)
            .map_err(|e| WorkerError::config_error(format!("sleep {} out of range: {}", name, e)))?;

        let wake_at: DateTime<Utc> = self.run(name, || async move { Ok(Utc::now() + delta) }).await?;

        let remaining = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return Ok(());
        }
        if remaining > self.inline_sleep_max {
            debug!(job_id = %self.job_id, step = name, %wake_at, "Suspending until wake-up");
            return Err(WorkerError::Suspended { resume_at: wake_at });
        }

        tokio::time::sleep(remaining).await;
        Ok(())
    }
}
