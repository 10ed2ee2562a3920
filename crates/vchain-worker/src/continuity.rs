//! Last-frame continuity.
//!
//! Grabs a frame near the end of a finished segment so the next segment can
//! start from it. Extraction is best effort: every failure is absorbed into
//! a warning and the next segment starts without an image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vchain_models::{segment_id, VideoJob};
use vchain_storage::layout;
use vchain_transcoder::{ExtractionRequest, JobPoll, JobState, TranscoderJobHandle};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::steps::StepContext;

/// Memoized result of one continuity extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityOutcome {
    /// Bucket key of the extracted frame
    pub frame_key: Option<String>,
    /// Why no frame is available
    pub warning: Option<String>,
}

/// Extract the last frame of segment `index`.
///
/// Only a suspension, a step-store failure or an undecodable recorded step
/// escapes; the outcome itself is memoized as `continuity-{index}`.
pub async fn extract_last_frame(
    ctx: &PipelineContext,
    steps: &StepContext,
    job: &VideoJob,
    index: usize,
    segment_uri: &str,
) -> WorkerResult<ContinuityOutcome> {
    let logger = JobLogger::new(&job.id, "continuity");

    steps
        .run(&format!("continuity-{}", index), || async {
            let mut last_problem = String::new();
            for attempt in 1..=ctx.config.frame_extraction_attempts {
                match try_extract(ctx, steps, job, index, attempt, segment_uri).await {
                    Ok(frame_key) => {
                        metrics::record_continuity("extracted");
                        return Ok(ContinuityOutcome {
                            frame_key: Some(frame_key),
                            warning: None,
                        });
                    }
                    Err(
                        e @ (WorkerError::Suspended { .. } | WorkerError::Firestore(_) | WorkerError::Json(_)),
                    ) => return Err(e),
                    Err(e) => {
                        logger.log_warning(&format!(
                            "frame extraction for segment {} attempt {} failed: {}",
                            index + 1,
                            attempt,
                            e
                        ));
                        last_problem = e.to_string();
                    }
                }
            }

            metrics::record_continuity("skipped");
            Ok(ContinuityOutcome {
                frame_key: None,
                warning: Some(format!(
                    "Segment {} continuity frame unavailable ({}); next segment generated without a start image",
                    index + 1,
                    last_problem
                )),
            })
        })
        .await
}

/// Load the extracted frame as a `data:` URL start image.
pub async fn load_start_image(ctx: &PipelineContext, outcome: &ContinuityOutcome) -> WorkerResult<Option<String>> {
    let Some(key) = outcome.frame_key.as_deref() else {
        return Ok(None);
    };
    let bytes = ctx.blobs.download(key).await?;
    Ok(Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))))
}

async fn try_extract(
    ctx: &PipelineContext,
    steps: &StepContext,
    job: &VideoJob,
    index: usize,
    attempt: u32,
    segment_uri: &str,
) -> WorkerResult<String> {
    let seg_id = segment_id(&job.id, index);
    let request = ExtractionRequest {
        source_uri: segment_uri.to_string(),
        offset_secs: ctx.config.frame_offset(),
        output_uri: ctx.blobs.object_uri(&layout::frame_dir(&job.owner_id, &seg_id)),
        resolution: job.options.aspect_ratio.resolution(),
    };

    let handle: TranscoderJobHandle = steps
        .run(&format!("extract-frame-{}-{}", index, attempt), || async {
            Ok(ctx.transcoder.create_extraction_job(&request).await?)
        })
        .await?;

    let polls = ctx.config.frame_max_poll_attempts;
    let mut succeeded = false;
    for n in 1..=polls {
        steps
            .sleep(
                &format!("wait-frame-{}-{}-{}", index, attempt, n),
                ctx.config.frame_poll_interval,
            )
            .await?;

        let poll: JobPoll = steps
            .run(&format!("poll-frame-{}-{}-{}", index, attempt, n), || async {
                match ctx.transcoder.poll_job(&handle).await {
                    Ok(poll) => Ok(poll),
                    Err(e) => {
                        warn!(job_id = %job.id, transcoder_job = %handle, "Frame poll failed: {}", e);
                        Ok(JobPoll::default())
                    }
                }
            })
            .await?;

        match poll.state {
            JobState::Succeeded => {
                succeeded = true;
                break;
            }
            JobState::Failed => {
                return Err(WorkerError::ExtractionFailed(
                    poll.error.unwrap_or_else(|| "transcoder job failed".into()),
                ))
            }
            _ => {}
        }
    }

    if !succeeded {
        return Err(WorkerError::ExtractionTimeout { attempts: polls });
    }

    let frames = ctx
        .blobs
        .list(&layout::frame_prefix(&job.owner_id, &seg_id))
        .await?;
    frames
        .into_iter()
        .next()
        .ok_or_else(|| WorkerError::ExtractionFailed("no frame written".into()))
}
