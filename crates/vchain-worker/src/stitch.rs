//! Final concatenation.

use tracing::{info, warn};

use vchain_models::{to_gcs_uri, JobStatus, JobUpdate, VideoJob};
use vchain_storage::layout;
use vchain_transcoder::{ConcatenationRequest, JobPoll, JobState, TranscoderJobHandle};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{guard, transition};
use crate::steps::StepContext;

/// Concatenate `segment_uris` in order and return a signed URL of the result.
///
/// Writes the `stitching` status once the transcoder job exists and checks
/// for an external failure before every poll.
pub async fn stitch(
    ctx: &PipelineContext,
    steps: &StepContext,
    job: &VideoJob,
    segment_uris: &[String],
) -> WorkerResult<String> {
    let logger = JobLogger::new(&job.id, "stitch");

    let request = ConcatenationRequest {
        input_uris: segment_uris.iter().map(|u| to_gcs_uri(u)).collect(),
        output_uri: ctx
            .blobs
            .object_uri(&layout::output_dir(&job.owner_id, job.id.as_str())),
        resolution: job.options.aspect_ratio.resolution(),
        include_audio: job.options.include_audio(),
    };

    let handle: TranscoderJobHandle = steps
        .run("create-stitch-job", || async {
            Ok(ctx.transcoder.create_concatenation_job(&request).await?)
        })
        .await?;

    steps
        .run("mark-stitching", || {
            transition(
                ctx,
                &job.id,
                JobStatus::Stitching,
                JobUpdate::new()
                    .current_step("stitching")
                    .transcoder_job_name(handle.as_str()),
            )
        })
        .await?;

    logger.log_progress(&format!("stitching {} segments as {}", segment_uris.len(), handle));

    let attempts = ctx.config.stitch_max_poll_attempts;
    let mut finished = false;
    for n in 1..=attempts {
        steps
            .sleep(&format!("wait-stitch-{}", n), ctx.config.stitch_poll_interval)
            .await?;
        guard(ctx, &job.id).await?;

        let poll: JobPoll = steps
            .run(&format!("poll-stitch-{}", n), || async {
                match ctx.transcoder.poll_job(&handle).await {
                    Ok(poll) => Ok(poll),
                    Err(e) => {
                        warn!(job_id = %job.id, transcoder_job = %handle, "Stitch poll failed: {}", e);
                        Ok(JobPoll::default())
                    }
                }
            })
            .await?;

        match poll.state {
            JobState::Succeeded => {
                finished = true;
                break;
            }
            JobState::Failed => {
                return Err(WorkerError::stitch_failed(
                    poll.error.unwrap_or_else(|| "transcoder reported FAILED".into()),
                ))
            }
            _ => {}
        }
    }

    if !finished {
        return Err(WorkerError::StitchTimeout { attempts });
    }

    let output_key = layout::final_output_key(&job.owner_id, job.id.as_str());
    let url: String = steps
        .run("sign-output-url", || async {
            Ok(ctx.blobs.signed_url(&output_key, ctx.config.signed_url_ttl).await?)
        })
        .await?;

    info!(job_id = %job.id, key = %output_key, "Stitched output ready");
    Ok(url)
}
