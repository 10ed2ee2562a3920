//! Generative Language API client for Veo.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{VeoError, VeoResult};
use crate::provider::GenerationProvider;
use crate::types::{GenerationRequest, OperationHandle, OperationName, OperationStatus, PredictRequest};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default video model.
pub const DEFAULT_MODEL_ID: &str = "veo-3.1-generate-preview";

/// Configuration for the Veo client.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    /// API key
    pub api_key: String,
    /// Model ID
    pub model_id: String,
    /// API root (overridable for tests)
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl VeoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> VeoResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| VeoError::config_error("GEMINI_API_KEY not set"))?;
        if api_key.trim().is_empty() {
            return Err(VeoError::config_error("GEMINI_API_KEY cannot be empty"));
        }

        Ok(Self {
            api_key,
            model_id: std::env::var("VEO_MODEL_ID").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string()),
            base_url: std::env::var("VEO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("VEO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

/// Veo HTTP client.
#[derive(Clone)]
pub struct VeoClient {
    http: Client,
    config: VeoConfig,
}

impl VeoClient {
    pub fn new(config: VeoConfig) -> VeoResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("vchain-veo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(VeoError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> VeoResult<Self> {
        Self::new(VeoConfig::from_env()?)
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl GenerationProvider for VeoClient {
    async fn start_generation(&self, request: &GenerationRequest) -> VeoResult<OperationHandle> {
        let url = format!("{}/models/{}:predictLongRunning", self.base(), self.config.model_id);
        let body = PredictRequest::from(request);
        let span = info_span!("veo_start", model = %self.config.model_id);

        async {
            let response = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.config.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(VeoError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let op: OperationName = response.json().await?;
            let name = op
                .name
                .filter(|n| !n.is_empty())
                .ok_or(VeoError::MissingOperationName)?;

            info!(operation = %name, "Started Veo generation");
            Ok(OperationHandle(name))
        }
        .instrument(span)
        .await
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> VeoResult<OperationStatus> {
        let url = format!("{}/{}", self.base(), handle.as_str().trim_start_matches('/'));

        let response = match self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(operation = %handle, "Veo poll request failed: {}", e);
                return Ok(OperationStatus::pending());
            }
        };

        if !response.status().is_success() {
            warn!(operation = %handle, status = %response.status(), "Veo poll returned non-success");
            return Ok(OperationStatus::pending());
        }

        let status: OperationStatus = response.json().await?;
        debug!(operation = %handle, done = status.done, "Polled Veo operation");
        Ok(status)
    }

    async fn download_video(&self, uri: &str) -> VeoResult<Vec<u8>> {
        let response = self
            .http
            .get(uri)
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VeoError::DownloadFailed(format!(
                "{} returned {}",
                uri,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        info!(bytes = bytes.len(), "Downloaded generated video");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use vchain_models::GenerationOptions;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> VeoClient {
        let mut config = VeoConfig::new("test-key");
        config.base_url = server.uri();
        VeoClient::new(config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "sunrise over mountains".into(),
            image_base64: None,
            options: GenerationOptions::default(),
            duration_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_start_generation_returns_operation_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-3.1-generate-preview:predictLongRunning"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "operations/op-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let handle = client_for(&server).start_generation(&request()).await.unwrap();
        assert_eq!(handle.as_str(), "operations/op-1");
    }

    #[tokio::test]
    async fn test_start_generation_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
            .mount(&server)
            .await;

        let err = client_for(&server).start_generation(&request()).await.unwrap_err();
        assert!(matches!(err, VeoError::Rejected { status: 400, ref body } if body == "bad prompt"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_start_generation_without_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = client_for(&server).start_generation(&request()).await.unwrap_err();
        assert!(matches!(err, VeoError::MissingOperationName));
    }

    #[tokio::test]
    async fn test_poll_done_operation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op-1",
                "done": true,
                "response": {"outputs": [{"video": {"bytesBase64Encoded": "AAAA"}}]}
            })))
            .mount(&server)
            .await;

        let status = client_for(&server)
            .poll_operation(&OperationHandle("operations/op-1".into()))
            .await
            .unwrap();
        assert!(status.done);
        assert!(status.response.is_some());
    }

    #[tokio::test]
    async fn test_poll_non_success_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let status = client_for(&server)
            .poll_operation(&OperationHandle("operations/op-1".into()))
            .await
            .unwrap();
        assert_eq!(status, OperationStatus::pending());
    }

    #[tokio::test]
    async fn test_download_video() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let bytes = client_for(&server)
            .download_video(&format!("{}/files/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    #[serial]
    fn test_config_requires_api_key() {
        std::env::remove_var("GEMINI_API_KEY");
        assert!(VeoConfig::from_env().is_err());
    }
}
