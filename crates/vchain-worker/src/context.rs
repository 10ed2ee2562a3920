//! Collaborators shared by every pipeline run.

use std::sync::Arc;

use tracing::{info, warn};

use vchain_firestore::{
    FirestoreClient, InMemoryJobStore, InMemoryStepStore, JobRepository, JobStore, StepRepository,
    StepStore,
};
use vchain_storage::{BlobStore, BucketClient};
use vchain_transcoder::{TranscoderClient, TranscodingProvider};
use vchain_veo::{GenerationProvider, VeoClient};

use crate::config::PipelineConfig;
use crate::error::WorkerResult;

/// Stores, providers and budgets used by the pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub jobs: Arc<dyn JobStore>,
    pub steps: Arc<dyn StepStore>,
    pub generator: Arc<dyn GenerationProvider>,
    pub transcoder: Arc<dyn TranscodingProvider>,
    pub blobs: Arc<dyn BlobStore>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Build production collaborators from the environment.
    ///
    /// `STORE_BACKEND=memory` keeps job records and step results in process.
    pub async fn from_env(config: PipelineConfig) -> WorkerResult<Self> {
        let (jobs, steps): (Arc<dyn JobStore>, Arc<dyn StepStore>) =
            match std::env::var("STORE_BACKEND").as_deref() {
                Ok("memory") => {
                    warn!("Using in-memory job and step stores; state is lost on restart");
                    (Arc::new(InMemoryJobStore::new()), Arc::new(InMemoryStepStore::new()))
                }
                _ => {
                    let client = FirestoreClient::from_env().await?;
                    (
                        Arc::new(JobRepository::new(client.clone())),
                        Arc::new(StepRepository::new(client)),
                    )
                }
            };

        let blobs = BucketClient::from_env()?;
        let generator = VeoClient::from_env()?;
        let transcoder = TranscoderClient::from_env().await?;

        info!(bucket = blobs.bucket(), "Pipeline collaborators ready");

        Ok(Self {
            jobs,
            steps,
            generator: Arc::new(generator),
            transcoder: Arc::new(transcoder),
            blobs: Arc::new(blobs),
            config,
        })
    }
}
