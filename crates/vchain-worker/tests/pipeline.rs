//! Orchestrator behaviour against in-memory stores and provider fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use serde_json::json;

use common::{
    FailAfterFirstRead, FakeGenerator, FakeTranscoder, GenerationBehavior, Harness, BUCKET, FRAME_BYTES,
};
use vchain_firestore::{JobStore, StepStore};
use vchain_models::{JobStatus, VideoJob};
use vchain_transcoder::JobState;
use vchain_worker::{run_pipeline, PipelineConfig, PipelineOutcome};

fn distinct_statuses(history: &[VideoJob]) -> Vec<JobStatus> {
    let mut statuses: Vec<JobStatus> = Vec::new();
    for snapshot in history {
        if statuses.last() != Some(&snapshot.status) {
            statuses.push(snapshot.status);
        }
    }
    statuses
}

#[tokio::test]
async fn three_segment_job_moves_through_every_status() {
    let h = Harness::new();
    let id = h.create_job("job-3", 3).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder.clone(), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Completed { .. }));

    let history = h.jobs.history(&id).await;
    assert_eq!(
        distinct_statuses(&history),
        vec![
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Stitching,
            JobStatus::Completed
        ]
    );

    let mut observed_counts: Vec<u32> = history.iter().map(|j| j.completed_segments).collect();
    observed_counts.dedup();
    assert_eq!(observed_counts, vec![0, 1, 2, 3]);

    for snapshot in &history {
        assert_eq!(snapshot.segment_urls.len() as u32, snapshot.completed_segments);
        assert!(snapshot.segment_urls.len() as u32 <= snapshot.total_segments);
    }

    let (last, earlier) = history.split_last().unwrap();
    assert!(earlier.iter().all(|j| j.video_url.is_none()));
    assert!(last.video_url.is_some());
    assert_eq!(last.progress, 100);
    assert!(last.completed_at.is_some());
    assert_eq!(last.output.as_ref().unwrap().metadata.resolution, "1280x720");
    assert_eq!(last.output.as_ref().unwrap().metadata.duration_seconds, 15.0);

    assert_eq!(
        last.segment_urls,
        vec![
            format!("gs://{}/videos/user-1/job-3_seg_0.mp4", BUCKET),
            format!("gs://{}/videos/user-1/job-3_seg_1.mp4", BUCKET),
            format!("gs://{}/videos/user-1/job-3_seg_2.mp4", BUCKET),
        ]
    );

    let stitched = transcoder.concatenations.lock().await;
    assert_eq!(stitched.len(), 1);
    assert_eq!(stitched[0].input_uris, last.segment_urls);
    assert_eq!(stitched[0].output_uri, format!("gs://{}/videos/user-1/job-3_output/", BUCKET));
}

#[tokio::test]
async fn progress_is_floored_per_segment() {
    let h = Harness::new();
    let id = h.create_job("job-progress", 3).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator, transcoder, PipelineConfig::fast());

    run_pipeline(&ctx, &id).await.unwrap();

    let mut progress: Vec<u8> = h.jobs.history(&id).await.iter().map(|j| j.progress).collect();
    progress.dedup();
    assert_eq!(progress, vec![0, 33, 66, 100]);
}

#[tokio::test]
async fn extracted_frame_seeds_the_next_segment() {
    let h = Harness::new();
    let id = h.create_job("job-frames", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder.clone(), PipelineConfig::fast());

    run_pipeline(&ctx, &id).await.unwrap();

    let requests = generator.requests.lock().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].image_base64, None);
    assert_eq!(requests[1].image_base64.as_deref(), Some(STANDARD.encode(FRAME_BYTES).as_str()));
    assert_eq!(transcoder.extraction_count(), 1);
}

#[tokio::test]
async fn replay_after_crash_does_not_restart_generation() {
    let h = Harness::new();
    let id = h.create_job("job-replay", 3).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));

    let mut broken = FakeTranscoder::new(h.blobs.clone());
    broken.fail_concat_create = true;
    let ctx = h.context(generator.clone(), Arc::new(broken), PipelineConfig::fast());

    let err = run_pipeline(&ctx, &id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.jobs.get(&id).await.unwrap().status, JobStatus::Processing);
    assert_eq!(generator.start_count(), 3);

    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder.clone(), PipelineConfig::fast());
    let outcome = run_pipeline(&ctx, &id).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
    assert_eq!(generator.start_count(), 3);
    assert_eq!(transcoder.extraction_count(), 0);
}

#[tokio::test]
async fn continuity_failure_does_not_fail_the_job() {
    let h = Harness::new();
    let id = h.create_job("job-no-frame", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let mut transcoder = FakeTranscoder::new(h.blobs.clone());
    transcoder.fail_extraction = true;
    let transcoder = Arc::new(transcoder);
    let ctx = h.context(generator.clone(), transcoder.clone(), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Completed { .. }));

    let requests = generator.requests.lock().await;
    assert_eq!(requests[1].image_base64, None);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.warnings.len(), 1);
    assert!(job.warnings[0].contains("Segment 1"));
    assert_eq!(transcoder.extraction_count(), PipelineConfig::fast().frame_extraction_attempts);
}

#[tokio::test]
async fn generation_timeout_fails_without_video() {
    let h = Harness::new();
    let id = h.create_job("job-timeout", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::NeverDone));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator, transcoder, PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    let PipelineOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("timed out"));

    let history = h.jobs.history(&id).await;
    let failed_writes = history.iter().filter(|j| j.status == JobStatus::Failed).count();
    assert_eq!(failed_writes, 1);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.video_url.is_none());
    assert_eq!(job.completed_segments, 0);
    assert_eq!(job.error.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn provider_error_fails_the_job() {
    let h = Harness::new();
    let id = h.create_job("job-blocked", 1).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Errored));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator, transcoder, PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { ref error } if error.contains("safety filter")));
}

#[tokio::test]
async fn single_segment_skips_extraction() {
    let h = Harness::new();
    let id = h.create_job("job-single", 1).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::BucketUri));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator, transcoder.clone(), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
    assert_eq!(transcoder.extraction_count(), 0);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.segment_urls, vec![format!("gs://{}/provider/1.mp4", BUCKET)]);
}

#[tokio::test]
async fn externally_failed_job_stops_at_the_next_guard() {
    let h = Harness::new();
    let id = h.create_job("job-cancel", 3).await;
    let generator = Arc::new(FakeGenerator::cancelling(h.jobs.clone(), id.clone(), 1));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder, PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(generator.start_count(), 1);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled by admin"));
    assert!(job.video_url.is_none());
}

#[tokio::test]
async fn failure_during_stitch_is_never_overwritten_by_completion() {
    let h = Harness::new();
    let id = h.create_job("job-cancel-stitch", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let mut transcoder = FakeTranscoder::new(h.blobs.clone());
    transcoder.cancel_on_stitch_poll = Some((h.jobs.clone(), id.clone(), JobState::Succeeded));
    let ctx = h.context(generator, Arc::new(transcoder), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled by admin"));
    assert!(job.video_url.is_none());
    assert!(job.completed_at.is_none());

    let history = h.jobs.history(&id).await;
    assert!(history.iter().all(|j| j.status != JobStatus::Completed));
    assert_eq!(history.last().unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn stitch_polling_stops_once_the_job_is_failed() {
    let h = Harness::new();
    let id = h.create_job("job-cancel-polling", 1).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let mut transcoder = FakeTranscoder::new(h.blobs.clone());
    transcoder.cancel_on_stitch_poll = Some((h.jobs.clone(), id.clone(), JobState::Running));
    let transcoder = Arc::new(transcoder);
    let ctx = h.context(generator, transcoder.clone(), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(transcoder.stitch_poll_count(), 1);

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.video_url.is_none());
}

#[tokio::test]
async fn failure_before_processing_is_not_overwritten() {
    let h = Harness::new();
    let id = h.create_job("job-cancel-early", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let mut ctx = h.context(generator.clone(), transcoder, PipelineConfig::fast());
    ctx.jobs = Arc::new(FailAfterFirstRead::new(h.jobs.clone()));

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(generator.start_count(), 0);

    let history = h.jobs.history(&id).await;
    assert_eq!(distinct_statuses(&history), vec![JobStatus::Queued, JobStatus::Failed]);
    assert_eq!(h.jobs.get(&id).await.unwrap().error.as_deref(), Some("cancelled by admin"));
}

#[tokio::test]
async fn unreadable_extraction_record_is_not_memoized_as_missing_frame() {
    let h = Harness::new();
    let id = h.create_job("job-bad-step", 2).await;
    h.steps
        .save(&id, "extract-frame-0-1", &json!({"unexpected": true}))
        .await
        .unwrap();
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder.clone(), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { ref error } if error.contains("JSON")));
    assert_eq!(generator.start_count(), 1);
    assert_eq!(transcoder.extraction_count(), 0);

    let steps = h.steps.step_names(&id).await;
    assert!(!steps.contains(&"continuity-0".to_string()));
    assert!(h.jobs.get(&id).await.unwrap().warnings.is_empty());
}

#[tokio::test]
async fn stitch_failure_carries_provider_detail() {
    let h = Harness::new();
    let id = h.create_job("job-stitch-fail", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let mut transcoder = FakeTranscoder::new(h.blobs.clone());
    transcoder.stitch_error = Some("input1 has no video stream".into());
    let ctx = h.context(generator, Arc::new(transcoder), PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    let PipelineOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("input1 has no video stream"));

    let job = h.jobs.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.transcoder_job_name.as_deref(), Some("jobs/stitch-1"));
    assert!(job.video_url.is_none());
}

#[tokio::test]
async fn long_waits_suspend_the_run() {
    let h = Harness::new();
    let id = h.create_job("job-suspend", 2).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let config = PipelineConfig {
        segment_poll_interval: Duration::from_secs(120),
        ..PipelineConfig::fast()
    };
    let ctx = h.context(generator.clone(), transcoder, config);

    let first = run_pipeline(&ctx, &id).await.unwrap();
    let second = run_pipeline(&ctx, &id).await.unwrap();
    match (first, second) {
        (PipelineOutcome::Suspended { resume_at: a }, PipelineOutcome::Suspended { resume_at: b }) => {
            assert_eq!(a, b)
        }
        other => panic!("expected suspensions, got {:?}", other),
    }

    assert_eq!(generator.start_count(), 1);
    assert_eq!(h.jobs.get(&id).await.unwrap().status, JobStatus::Processing);
}

#[tokio::test]
async fn job_without_prompts_is_failed() {
    let h = Harness::new();
    let id = h.create_job("job-empty", 0).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder, PipelineConfig::fast());

    let outcome = run_pipeline(&ctx, &id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
    assert_eq!(generator.start_count(), 0);
}

#[tokio::test]
async fn finished_jobs_are_not_rerun() {
    let h = Harness::new();
    let id = h.create_job("job-done", 1).await;
    let generator = Arc::new(FakeGenerator::new(GenerationBehavior::Inline));
    let transcoder = Arc::new(FakeTranscoder::new(h.blobs.clone()));
    let ctx = h.context(generator.clone(), transcoder, PipelineConfig::fast());

    run_pipeline(&ctx, &id).await.unwrap();
    let again = run_pipeline(&ctx, &id).await.unwrap();
    assert_eq!(
        again,
        PipelineOutcome::AlreadyFinished {
            status: JobStatus::Completed
        }
    );
    assert_eq!(generator.start_count(), 1);
}
