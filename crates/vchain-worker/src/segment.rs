//! Segment generation.
//!
//! One segment is a started provider operation followed by a bounded poll
//! loop. Each poll is its own step, and a finished operation's video is
//! persisted to the bucket inside that step, so only a URI is memoized.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, Instrument};

use vchain_models::{segment_id, to_gcs_uri, validate_start_image, VideoJob};
use vchain_storage::layout;
use vchain_veo::{parse_generated_video, GeneratedVideo, GenerationRequest, OperationHandle, VeoError};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::steps::StepContext;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Generate segment `index` and return its `gs://` URI.
pub async fn generate_segment(
    ctx: &PipelineContext,
    steps: &StepContext,
    job: &VideoJob,
    index: usize,
    start_image: Option<String>,
) -> WorkerResult<String> {
    let logger = JobLogger::new(&job.id, "segment");
    let prompt = job
        .prompts
        .get(index)
        .cloned()
        .ok_or_else(|| WorkerError::config_error(format!("no prompt for segment {}", index)))?;

    let image_base64 = start_image.as_deref().map(validate_start_image).transpose()?;
    let request = GenerationRequest {
        prompt,
        image_base64,
        options: job.options.clone(),
        duration_secs: ctx.config.segment_duration_secs,
    };

    let handle: OperationHandle = steps
        .run(&format!("generate-segment-{}", index), || async {
            ctx.generator
                .start_generation(&request)
                .await
                .map_err(|e| trigger_error(index, e))
        })
        .instrument(logger.create_span())
        .await?;

    logger.log_progress(&format!(
        "segment {}/{} started as {}",
        index + 1,
        job.total_segments,
        handle
    ));

    let attempts = ctx.config.segment_max_poll_attempts;
    for attempt in 1..=attempts {
        steps
            .sleep(
                &format!("wait-segment-{}-{}", index, attempt),
                ctx.config.segment_poll_interval,
            )
            .await?;

        let finished: Option<String> = steps
            .run(&format!("check-status-{}-{}", index, attempt), || {
                check_operation(ctx, job, index, &handle)
            })
            .await?;

        if let Some(uri) = finished {
            info!(job_id = %job.id, segment = index, attempt, uri = %uri, "Segment ready");
            metrics::record_segment("completed");
            return Ok(uri);
        }
    }

    metrics::record_segment("timeout");
    Err(WorkerError::GenerationTimeout {
        segment: index,
        attempts,
    })
}

/// Map a start failure: provider overload is retried by the queue, any other
/// rejection fails the job.
fn trigger_error(index: usize, err: VeoError) -> WorkerError {
    if err.is_retryable() {
        WorkerError::Veo(err)
    } else {
        WorkerError::ProviderTrigger {
            segment: index,
            message: err.to_string(),
        }
    }
}

/// One poll. `None` while the operation is still running.
async fn check_operation(
    ctx: &PipelineContext,
    job: &VideoJob,
    index: usize,
    handle: &OperationHandle,
) -> WorkerResult<Option<String>> {
    let status = ctx.generator.poll_operation(handle).await?;
    if !status.done {
        return Ok(None);
    }

    if let Some(err) = status.error {
        metrics::record_segment("failed");
        return Err(WorkerError::GenerationFailed {
            segment: index,
            message: err.message,
        });
    }

    let response = status.response.ok_or_else(|| {
        WorkerError::UnrecognizedResponseFormat("operation finished without a response".into())
    })?;
    let video = parse_generated_video(&response).map_err(|e| match e {
        VeoError::UnrecognizedResponse(shape) => WorkerError::UnrecognizedResponseFormat(shape),
        other => WorkerError::Veo(other),
    })?;

    persist_video(ctx, job, index, video).await.map(Some)
}

/// Make sure the segment lives in our bucket and return its `gs://` URI.
async fn persist_video(
    ctx: &PipelineContext,
    job: &VideoJob,
    index: usize,
    video: GeneratedVideo,
) -> WorkerResult<String> {
    let key = layout::segment_key(&job.owner_id, &segment_id(&job.id, index));

    let bytes = match video {
        GeneratedVideo::Inline(encoded) => STANDARD.decode(encoded.trim()).map_err(|e| {
            WorkerError::UnrecognizedResponseFormat(format!("inline video is not base64: {}", e))
        })?,
        GeneratedVideo::Uri(uri) => {
            let normalized = to_gcs_uri(&uri);
            if normalized.starts_with("gs://") {
                return Ok(normalized);
            }
            ctx.generator.download_video(&uri).await?
        }
    };

    Ok(ctx.blobs.save(&key, bytes, VIDEO_CONTENT_TYPE).await?)
}
