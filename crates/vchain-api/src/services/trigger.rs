//! Long-form trigger: validate, create the job record, enqueue.

use serde::Serialize;
use tracing::{error, info, warn};

use vchain_firestore::{FirestoreError, JobStore};
use vchain_models::{JobStatus, JobUpdate, LongFormRequest, VideoJob};
use vchain_queue::{GenerateVideoJob, JobPublisher};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Accepted-job acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub job_id: String,
    pub message: String,
}

/// Start a long-form job.
///
/// Nothing is written when validation fails. If the record was created but
/// the enqueue fails, the record is marked failed so it never sits in
/// `queued` with no worker coming for it.
pub async fn trigger_long_form(
    jobs: &dyn JobStore,
    publisher: &dyn JobPublisher,
    request: LongFormRequest,
) -> ApiResult<TriggerResponse> {
    if let Err(e) = request.validate() {
        metrics::record_trigger("invalid");
        return Err(e.into());
    }

    let job = VideoJob::queued(&request);

    match jobs.create(&job).await {
        Ok(()) => {}
        Err(FirestoreError::AlreadyExists(_)) => {
            metrics::record_trigger("duplicate");
            return Err(ApiError::AlreadyExists(format!("job {} already exists", job.id)));
        }
        Err(e) => {
            metrics::record_trigger("error");
            return Err(e.into());
        }
    }

    let message = GenerateVideoJob::new(job.id.clone(), job.owner_id.clone());
    if let Err(e) = publisher.publish(message).await {
        error!(job_id = %job.id, "Failed to enqueue long-form job: {}", e);
        metrics::record_trigger("error");

        let failed = JobUpdate::new()
            .status(JobStatus::Failed)
            .error(format!("Failed to queue long form job: {}", e));
        if let Err(mark_err) = jobs.merge(&job.id, &failed).await {
            warn!(job_id = %job.id, "Failed to mark unqueued job as failed: {}", mark_err);
        }

        return Err(ApiError::internal(format!("Failed to queue long form job: {}", e)));
    }

    info!(
        job_id = %job.id,
        owner_id = %job.owner_id,
        segments = job.total_segments,
        "Long-form job queued"
    );
    metrics::record_trigger("accepted");

    Ok(TriggerResponse {
        success: true,
        job_id: job.id.to_string(),
        message: "Long form video generation started.".to_string(),
    })
}
