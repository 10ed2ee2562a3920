//! Provider fakes and fixtures for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tokio::sync::Mutex;

use vchain_firestore::{FirestoreResult, InMemoryJobStore, InMemoryStepStore, JobStore};
use vchain_models::{JobId, JobStatus, JobUpdate, LongFormRequest, VideoJob};
use vchain_storage::{BlobStore, InMemoryBlobStore};
use vchain_transcoder::{
    ConcatenationRequest, ExtractionRequest, JobPoll, JobState, TranscoderError, TranscoderJobHandle,
    TranscoderResult, TranscodingProvider,
};
use vchain_veo::{
    GenerationProvider, GenerationRequest, OperationError, OperationHandle, OperationStatus, VeoResult,
};
use vchain_worker::{PipelineConfig, PipelineContext};

pub const BUCKET: &str = "test-bucket";
pub const FRAME_BYTES: &[u8] = b"jpeg-frame";

/// How the fake generator finishes operations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GenerationBehavior {
    /// Done on the second poll with inline bytes
    Inline,
    /// Done on the second poll with a bucket URI
    BucketUri,
    /// Never done
    NeverDone,
    /// Done with an error object
    Errored,
}

pub struct FakeGenerator {
    behavior: GenerationBehavior,
    pub starts: AtomicU32,
    pub requests: Mutex<Vec<GenerationRequest>>,
    polls: Mutex<HashMap<String, u32>>,
    /// Mark this job failed right after the given start number (1-based)
    cancel_after_start: Option<(Arc<InMemoryJobStore>, JobId, u32)>,
}

impl FakeGenerator {
    pub fn new(behavior: GenerationBehavior) -> Self {
        Self {
            behavior,
            starts: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            cancel_after_start: None,
        }
    }

    pub fn cancelling(jobs: Arc<InMemoryJobStore>, job_id: JobId, after_start: u32) -> Self {
        Self {
            cancel_after_start: Some((jobs, job_id, after_start)),
            ..Self::new(GenerationBehavior::Inline)
        }
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn start_generation(&self, request: &GenerationRequest) -> VeoResult<OperationHandle> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(request.clone());

        if let Some((jobs, job_id, after)) = &self.cancel_after_start {
            if n == *after {
                jobs.merge(
                    job_id,
                    &JobUpdate::new().status(JobStatus::Failed).error("cancelled by admin"),
                )
                .await
                .unwrap();
            }
        }

        Ok(OperationHandle(format!("operations/op-{}", n)))
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> VeoResult<OperationStatus> {
        let mut polls = self.polls.lock().await;
        let count = polls.entry(handle.to_string()).or_insert(0);
        *count += 1;
        if *count < 2 || self.behavior == GenerationBehavior::NeverDone {
            return Ok(OperationStatus::pending());
        }

        let n = handle.as_str().trim_start_matches("operations/op-");
        Ok(match self.behavior {
            GenerationBehavior::Inline => OperationStatus {
                done: true,
                response: Some(json!({
                    "outputs": [{"video": {"bytesBase64Encoded": STANDARD.encode(format!("segment-{}", n))}}]
                })),
                error: None,
            },
            GenerationBehavior::BucketUri => OperationStatus {
                done: true,
                response: Some(json!({
                    "videos": [{"gcsUri": format!("gs://{}/provider/{}.mp4", BUCKET, n)}]
                })),
                error: None,
            },
            GenerationBehavior::Errored => OperationStatus {
                done: true,
                response: None,
                error: Some(OperationError {
                    code: Some(3),
                    message: "prompt blocked by safety filter".into(),
                }),
            },
            GenerationBehavior::NeverDone => unreachable!(),
        })
    }

    async fn download_video(&self, _uri: &str) -> VeoResult<Vec<u8>> {
        Ok(b"downloaded".to_vec())
    }
}

pub struct FakeTranscoder {
    blobs: Arc<InMemoryBlobStore>,
    pub fail_extraction: bool,
    pub fail_concat_create: bool,
    pub stitch_error: Option<String>,
    /// Mark this job failed on the first stitch poll, then report the given state
    pub cancel_on_stitch_poll: Option<(Arc<InMemoryJobStore>, JobId, JobState)>,
    pub extractions: AtomicU32,
    pub stitch_polls: AtomicU32,
    pub concatenations: Mutex<Vec<ConcatenationRequest>>,
}

impl FakeTranscoder {
    pub fn new(blobs: Arc<InMemoryBlobStore>) -> Self {
        Self {
            blobs,
            fail_extraction: false,
            fail_concat_create: false,
            stitch_error: None,
            cancel_on_stitch_poll: None,
            extractions: AtomicU32::new(0),
            stitch_polls: AtomicU32::new(0),
            concatenations: Mutex::new(Vec::new()),
        }
    }

    pub fn extraction_count(&self) -> u32 {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn stitch_poll_count(&self) -> u32 {
        self.stitch_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscodingProvider for FakeTranscoder {
    async fn create_extraction_job(&self, request: &ExtractionRequest) -> TranscoderResult<TranscoderJobHandle> {
        let n = self.extractions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_extraction {
            return Err(TranscoderError::RequestFailed {
                status: 400,
                body: "input not readable".into(),
            });
        }
        let dir = self.blobs.key_from_uri(&request.output_uri).unwrap();
        self.blobs
            .put(&format!("{}frame_0000000000.jpeg", dir), FRAME_BYTES.to_vec(), "image/jpeg")
            .await;
        Ok(TranscoderJobHandle(format!("jobs/frame-{}", n)))
    }

    async fn create_concatenation_job(
        &self,
        request: &ConcatenationRequest,
    ) -> TranscoderResult<TranscoderJobHandle> {
        if self.fail_concat_create {
            return Err(TranscoderError::RequestFailed {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        self.concatenations.lock().await.push(request.clone());
        let dir = self.blobs.key_from_uri(&request.output_uri).unwrap();
        self.blobs
            .put(&format!("{}final_output.mp4", dir), b"final".to_vec(), "video/mp4")
            .await;
        Ok(TranscoderJobHandle("jobs/stitch-1".into()))
    }

    async fn poll_job(&self, handle: &TranscoderJobHandle) -> TranscoderResult<JobPoll> {
        if handle.as_str().contains("stitch") {
            let n = self.stitch_polls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((jobs, job_id, state)) = &self.cancel_on_stitch_poll {
                if n == 1 {
                    jobs.merge(
                        job_id,
                        &JobUpdate::new().status(JobStatus::Failed).error("cancelled by admin"),
                    )
                    .await
                    .unwrap();
                    return Ok(JobPoll {
                        state: *state,
                        error: None,
                    });
                }
            }
            if let Some(error) = &self.stitch_error {
                return Ok(JobPoll {
                    state: JobState::Failed,
                    error: Some(error.clone()),
                });
            }
        }
        Ok(JobPoll {
            state: JobState::Succeeded,
            error: None,
        })
    }
}

/// Job store that fails the job behind the caller's back right after the
/// first read.
pub struct FailAfterFirstRead {
    inner: Arc<InMemoryJobStore>,
    reads: AtomicU32,
}

impl FailAfterFirstRead {
    pub fn new(inner: Arc<InMemoryJobStore>) -> Self {
        Self {
            inner,
            reads: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl JobStore for FailAfterFirstRead {
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()> {
        self.inner.create(job).await
    }

    async fn merge(&self, id: &JobId, update: &JobUpdate) -> FirestoreResult<()> {
        self.inner.merge(id, update).await
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<VideoJob> {
        let job = self.inner.get(id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner
                .merge(id, &JobUpdate::new().status(JobStatus::Failed).error("cancelled by admin"))
                .await?;
        }
        Ok(job)
    }
}

pub struct Harness {
    pub jobs: Arc<InMemoryJobStore>,
    pub steps: Arc<InMemoryStepStore>,
    pub blobs: Arc<InMemoryBlobStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            steps: Arc::new(InMemoryStepStore::new()),
            blobs: Arc::new(InMemoryBlobStore::new(BUCKET)),
        }
    }

    pub fn context(
        &self,
        generator: Arc<FakeGenerator>,
        transcoder: Arc<FakeTranscoder>,
        config: PipelineConfig,
    ) -> PipelineContext {
        PipelineContext {
            jobs: self.jobs.clone(),
            steps: self.steps.clone(),
            generator,
            transcoder,
            blobs: self.blobs.clone(),
            config,
        }
    }

    pub async fn create_job(&self, id: &str, prompts: usize) -> JobId {
        let request = LongFormRequest {
            job_id: id.into(),
            owner_id: "user-1".into(),
            prompts: (0..prompts).map(|i| format!("scene {}", i + 1)).collect(),
            ..Default::default()
        };
        let job = VideoJob::queued(&request);
        self.jobs.create(&job).await.unwrap();
        job.id
    }
}
