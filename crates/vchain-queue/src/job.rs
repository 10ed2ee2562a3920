//! Job payloads carried on the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vchain_models::JobId;

/// Run (or resume) the generation pipeline for one job record.
///
/// The payload only names the record; everything else is read from the
/// job store when the worker picks it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    pub job_id: JobId,
    pub owner_id: String,
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this job was re-delivered after a suspension
    #[serde(default)]
    pub resumptions: u32,
}

impl GenerateVideoJob {
    pub fn new(job_id: JobId, owner_id: impl Into<String>) -> Self {
        Self {
            job_id,
            owner_id: owner_id.into(),
            enqueued_at: Utc::now(),
            resumptions: 0,
        }
    }

    /// Copy scheduled for re-delivery after a suspension.
    pub fn resumed(&self) -> Self {
        Self {
            enqueued_at: Utc::now(),
            resumptions: self.resumptions + 1,
            ..self.clone()
        }
    }

    /// Key for deduplicating enqueues of the same record.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}", self.job_id)
    }
}
