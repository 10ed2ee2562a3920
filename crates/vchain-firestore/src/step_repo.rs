//! Memoized step results (`video_jobs/{job_id}/steps/{step_name}`).
//!
//! Each step result is stored as serialized JSON in `output_json` so the
//! executor can replay arbitrary return values without a schema per step.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::debug;

use vchain_models::JobId;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::job_repo::JOBS_COLLECTION;
use crate::store::StepStore;
use crate::types::ToFirestoreValue;

/// Firestore-backed step result store.
#[derive(Clone)]
pub struct StepRepository {
    client: FirestoreClient,
}

impl StepRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn collection(job_id: &JobId) -> String {
        format!("{}/{}/steps", JOBS_COLLECTION, job_id)
    }
}

#[async_trait]
impl StepStore for StepRepository {
    async fn load(&self, job_id: &JobId, step: &str) -> FirestoreResult<Option<JsonValue>> {
        let collection = Self::collection(job_id);
        let doc = self
            .client
            .with_retry("load_step", || self.client.get_document(&collection, step))
            .await?;

        let Some(doc) = doc else {
            return Ok(None);
        };

        let raw: String = doc.get("output_json").ok_or_else(|| {
            FirestoreError::invalid_response(format!("step {} has no output_json", step))
        })?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, job_id: &JobId, step: &str, output: &JsonValue) -> FirestoreResult<()> {
        let collection = Self::collection(job_id);
        let mut fields = HashMap::new();
        fields.insert(
            "output_json".to_string(),
            serde_json::to_string(output)?.to_firestore_value(),
        );
        fields.insert("step".to_string(), step.to_firestore_value());
        fields.insert("completed_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .with_retry("save_step", || {
                self.client.set_document(&collection, step, fields.clone())
            })
            .await?;
        debug!(job_id = %job_id, step = %step, "Recorded step result");
        Ok(())
    }
}
