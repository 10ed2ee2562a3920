//! Job state machine.
//!
//! `queued -> processing -> stitching -> completed`, with `failed` reachable
//! from every non-terminal state. Every record write happens inside a named
//! step, so a re-delivered job replays finished work and resumes where it
//! stopped.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::Instrument;

use vchain_models::{
    progress_percent, JobId, JobStatus, JobUpdate, OutputMetadata, ValidationError, VideoJob,
    VideoOutput,
};

use crate::context::PipelineContext;
use crate::continuity;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::segment;
use crate::steps::StepContext;
use crate::stitch;

const OUTPUT_FPS: u32 = 30;
const OUTPUT_MIME_TYPE: &str = "video/mp4";

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed { video_url: String },
    /// The failure was recorded on the job
    Failed { error: String },
    /// The job was failed externally while running
    Cancelled,
    /// Waiting on a durable sleep; re-deliver at `resume_at`
    Suspended { resume_at: DateTime<Utc> },
    /// Nothing to do, the job was already in a final state
    AlreadyFinished { status: JobStatus },
}

/// Run (or resume) the pipeline for one job.
///
/// Retryable infrastructure errors are returned as `Err` so the caller can
/// re-deliver the job; every other failure is recorded on the job and
/// reported as [`PipelineOutcome::Failed`].
pub async fn run_pipeline(ctx: &PipelineContext, job_id: &JobId) -> WorkerResult<PipelineOutcome> {
    let logger = JobLogger::new(job_id, "long_form_video");
    let started = Instant::now();

    let job = ctx.jobs.get(job_id).await?;
    if job.status.is_terminal() {
        logger.log_progress(&format!("already {}, skipping", job.status));
        return Ok(PipelineOutcome::AlreadyFinished { status: job.status });
    }

    let steps = StepContext::new(job_id.clone(), ctx.steps.clone(), ctx.config.inline_sleep_max);
    let result = drive(ctx, &steps, &job, &logger)
        .instrument(logger.create_span())
        .await;
    metrics::record_run_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(video_url) => {
            logger.log_completion(&format!("{} segments stitched", job.total_segments));
            metrics::record_job("completed");
            Ok(PipelineOutcome::Completed { video_url })
        }
        Err(WorkerError::Suspended { resume_at }) => {
            logger.log_progress(&format!("suspended until {}", resume_at));
            metrics::record_job("suspended");
            Ok(PipelineOutcome::Suspended { resume_at })
        }
        Err(WorkerError::Cancelled(reason)) => {
            logger.log_warning(&format!("stopped: {}", reason));
            metrics::record_job("cancelled");
            Ok(PipelineOutcome::Cancelled)
        }
        Err(e) if e.is_retryable() => {
            logger.log_warning(&format!("transient failure, will retry: {}", e));
            metrics::record_job("retried");
            Err(e)
        }
        Err(e) => {
            let error = e.to_string();
            logger.log_error(&error);
            fail_job(ctx, job_id, &error).await?;
            metrics::record_job("failed");
            Ok(PipelineOutcome::Failed { error })
        }
    }
}

/// Record a terminal failure on the job exactly once.
pub async fn fail_job(ctx: &PipelineContext, job_id: &JobId, error: &str) -> WorkerResult<()> {
    let steps = StepContext::new(job_id.clone(), ctx.steps.clone(), ctx.config.inline_sleep_max);
    steps
        .run("mark-failed", || async {
            let current = ctx.jobs.get(job_id).await?;
            if current.status.is_terminal() {
                return Ok(());
            }
            ctx.jobs
                .merge(job_id, &JobUpdate::new().status(JobStatus::Failed).error(error))
                .await?;
            Ok(())
        })
        .await
}

/// Stop if the job was failed by someone else.
pub(crate) async fn guard(ctx: &PipelineContext, job_id: &JobId) -> WorkerResult<()> {
    let current = ctx.jobs.get(job_id).await?;
    if current.status == JobStatus::Failed {
        return Err(cancellation(current));
    }
    Ok(())
}

/// Merge `update` with status `next`, re-reading the record first.
///
/// A job failed by someone else stops the run with `Cancelled`, as does any
/// other move the lifecycle forbids. Re-writing the current status is
/// allowed so a step interrupted after its write can replay.
pub(crate) async fn transition(
    ctx: &PipelineContext,
    job_id: &JobId,
    next: JobStatus,
    update: JobUpdate,
) -> WorkerResult<()> {
    let current = ctx.jobs.get(job_id).await?;
    if current.status == JobStatus::Failed {
        return Err(cancellation(current));
    }
    if current.status != next && !current.status.can_transition_to(next) {
        return Err(WorkerError::Cancelled(format!(
            "job is {}, cannot move to {}",
            current.status, next
        )));
    }
    ctx.jobs.merge(job_id, &update.status(next)).await?;
    Ok(())
}

fn cancellation(job: VideoJob) -> WorkerError {
    WorkerError::Cancelled(job.error.unwrap_or_else(|| "job marked failed".into()))
}

async fn drive(
    ctx: &PipelineContext,
    steps: &StepContext,
    job: &VideoJob,
    logger: &JobLogger,
) -> WorkerResult<String> {
    if job.prompts.is_empty() {
        return Err(ValidationError::EmptyPrompts.into());
    }
    let total = job.prompts.len();
    let total_u32 = total as u32;

    steps
        .run("mark-processing", || {
            transition(
                ctx,
                &job.id,
                JobStatus::Processing,
                JobUpdate::new().current_step("generating"),
            )
        })
        .await?;
    logger.log_start(&format!("{} segments", total));

    let mut segment_urls: Vec<String> = Vec::with_capacity(total);
    // Rebuilt from memoized continuity outcomes on every run.
    let mut warnings: Vec<String> = Vec::new();
    let mut start_image = job.start_image.clone();

    for index in 0..total {
        guard(ctx, &job.id).await?;

        let url = segment::generate_segment(ctx, steps, job, index, start_image.take()).await?;
        segment_urls.push(url);

        let completed = (index + 1) as u32;
        let is_last = index + 1 == total;
        let update = JobUpdate::new()
            .completed_segments(completed)
            .segment_urls(segment_urls.clone())
            .progress(progress_percent(completed, total_u32))
            .current_step(if is_last { "stitching" } else { "extracting-frame" });
        steps
            .run(&format!("record-segment-{}", index), || async {
                ctx.jobs.merge(&job.id, &update).await?;
                Ok(())
            })
            .await?;
        logger.log_progress(&format!("segment {}/{} recorded", completed, total));

        if is_last {
            break;
        }

        let outcome = continuity::extract_last_frame(ctx, steps, job, index, &segment_urls[index]).await?;
        if let Some(warning) = &outcome.warning {
            logger.log_warning(warning);
            warnings.push(warning.clone());
        }
        start_image = match continuity::load_start_image(ctx, &outcome).await {
            Ok(image) => image,
            Err(e) => {
                let warning = format!("Segment {} continuity frame unreadable ({})", index + 1, e);
                logger.log_warning(&warning);
                warnings.push(warning);
                None
            }
        };

        let mut update = JobUpdate::new().current_step("generating");
        if !warnings.is_empty() {
            update = update.warnings(warnings.clone());
        }
        steps
            .run(&format!("record-continuity-{}", index), || async {
                ctx.jobs.merge(&job.id, &update).await?;
                Ok(())
            })
            .await?;
    }

    guard(ctx, &job.id).await?;
    let video_url = stitch::stitch(ctx, steps, job, &segment_urls).await?;

    let resolution = job.options.aspect_ratio.resolution();
    let output = VideoOutput {
        url: video_url.clone(),
        metadata: OutputMetadata {
            duration_seconds: total as f64 * ctx.config.segment_duration_secs as f64,
            fps: OUTPUT_FPS,
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            resolution: resolution.to_string(),
        },
    };
    steps
        .run("mark-completed", || {
            transition(
                ctx,
                &job.id,
                JobStatus::Completed,
                JobUpdate::new()
                    .video_url(video_url.as_str())
                    .output(output)
                    .progress(100)
                    .current_step("completed")
                    .completed_at(Utc::now()),
            )
        })
        .await?;

    Ok(video_url)
}
