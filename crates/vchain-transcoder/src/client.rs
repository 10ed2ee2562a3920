//! Transcoder API REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Client;
use tracing::{debug, info, info_span, Instrument};

use crate::error::{TranscoderError, TranscoderResult};
use crate::provider::TranscodingProvider;
use crate::types::{
    ConcatenationRequest, CreateJobRequest, ExtractionRequest, JobConfig, JobPoll, JobResource,
    TranscoderJobHandle,
};

pub const DEFAULT_BASE_URL: &str = "https://transcoder.googleapis.com/v1";
pub const DEFAULT_LOCATION: &str = "us-central1";

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Configuration for the Transcoder client.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub project_id: String,
    pub location: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl TranscoderConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> TranscoderResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .map_err(|_| TranscoderError::config_error("GCP_PROJECT_ID not set"))?;

        Ok(Self {
            project_id,
            location: std::env::var("TRANSCODER_LOCATION").unwrap_or_else(|_| DEFAULT_LOCATION.to_string()),
            base_url: std::env::var("TRANSCODER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("TRANSCODER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/jobs",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.location
        )
    }
}

#[derive(Clone)]
enum Credentials {
    Provider(Arc<dyn TokenProvider>),
    Static(String),
}

/// Transcoder HTTP client.
#[derive(Clone)]
pub struct TranscoderClient {
    http: Client,
    config: TranscoderConfig,
    credentials: Credentials,
}

impl TranscoderClient {
    /// Create a client using application default credentials.
    pub async fn new(config: TranscoderConfig) -> TranscoderResult<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| TranscoderError::auth_error(format!("No GCP credentials: {}", e)))?;
        Self::build(config, Credentials::Provider(provider))
    }

    /// Create a client with a custom token provider.
    pub fn with_provider(config: TranscoderConfig, provider: Arc<dyn TokenProvider>) -> TranscoderResult<Self> {
        Self::build(config, Credentials::Provider(provider))
    }

    /// Create a client that sends a fixed bearer token (emulators, tests).
    pub fn with_static_token(config: TranscoderConfig, token: impl Into<String>) -> TranscoderResult<Self> {
        Self::build(config, Credentials::Static(token.into()))
    }

    pub async fn from_env() -> TranscoderResult<Self> {
        Self::new(TranscoderConfig::from_env()?).await
    }

    fn build(config: TranscoderConfig, credentials: Credentials) -> TranscoderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("vchain-transcoder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TranscoderError::Network)?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    async fn token(&self) -> TranscoderResult<String> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Provider(provider) => provider
                .token(&[CLOUD_PLATFORM_SCOPE])
                .await
                .map(|t| t.as_str().to_string())
                .map_err(|e| TranscoderError::auth_error(format!("Failed to obtain auth token: {}", e))),
        }
    }

    async fn create_job(&self, config: JobConfig, kind: &'static str) -> TranscoderResult<TranscoderJobHandle> {
        let span = info_span!("transcoder_create", kind);

        async {
            let token = self.token().await?;
            let response = self
                .http
                .post(self.config.jobs_url())
                .bearer_auth(token)
                .json(&CreateJobRequest { config })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TranscoderError::RequestFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            let job: JobResource = response.json().await?;
            let name = job
                .name
                .filter(|n| !n.is_empty())
                .ok_or_else(|| TranscoderError::InvalidResponse("created job has no name".into()))?;

            info!(job = %name, "Created transcoder job");
            Ok(TranscoderJobHandle(name))
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl TranscodingProvider for TranscoderClient {
    async fn create_extraction_job(&self, request: &ExtractionRequest) -> TranscoderResult<TranscoderJobHandle> {
        self.create_job(JobConfig::from(request), "extraction").await
    }

    async fn create_concatenation_job(
        &self,
        request: &ConcatenationRequest,
    ) -> TranscoderResult<TranscoderJobHandle> {
        if request.input_uris.is_empty() {
            return Err(TranscoderError::InvalidResponse("no inputs to concatenate".into()));
        }
        self.create_job(JobConfig::from(request), "concatenation").await
    }

    async fn poll_job(&self, handle: &TranscoderJobHandle) -> TranscoderResult<JobPoll> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            handle.as_str().trim_start_matches('/')
        );
        let token = self.token().await?;
        let response = self.http.get(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscoderError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let job: JobResource = response.json().await?;
        debug!(job = %handle, state = ?job.state, "Polled transcoder job");
        Ok(JobPoll {
            state: job.state,
            error: job.error.map(|e| e.message).filter(|m| !m.is_empty()),
        })
    }
}
