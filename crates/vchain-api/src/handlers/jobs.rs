//! Long-form job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use vchain_models::{JobId, JobStatus, LongFormRequest, VideoJob, VideoOutput};

use crate::error::{ApiError, ApiResult};
use crate::services::{trigger_long_form, TriggerResponse};
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Job status view returned to pollers. Prompts and the start image are
/// left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub owner_id: String,
    pub organization_id: String,
    pub status: JobStatus,
    pub total_segments: u32,
    pub completed_segments: u32,
    /// 0-100
    pub progress: u8,
    pub segment_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<VideoOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<VideoJob> for JobResponse {
    fn from(job: VideoJob) -> Self {
        Self {
            job_id: job.id.0,
            owner_id: job.owner_id,
            organization_id: job.organization_id,
            status: job.status,
            total_segments: job.total_segments,
            completed_segments: job.completed_segments,
            progress: job.progress,
            segment_urls: job.segment_urls,
            video_url: job.video_url,
            error: job.error,
            current_step: job.current_step,
            warnings: job.warnings,
            output: job.output,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/jobs/long-form`
pub async fn trigger_long_form_job(
    State(state): State<AppState>,
    payload: Result<Json<LongFormRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let response = trigger_long_form(state.jobs.as_ref(), state.publisher.as_ref(), request).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `GET /api/jobs/:job_id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .jobs
        .get(&JobId::from(job_id.as_str()))
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::not_found(format!("job {}", job_id))
            } else {
                e.into()
            }
        })?;

    Ok(Json(JobResponse::from(job)))
}
