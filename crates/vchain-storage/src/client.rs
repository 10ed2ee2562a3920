//! S3-compatible bucket client.
//!
//! Talks to Cloud Storage through its S3 interoperability endpoint using
//! HMAC keys, so the same bucket is addressable by the transcoding
//! provider as `gs://bucket/key`.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Default interoperability endpoint for Cloud Storage.
pub const DEFAULT_ENDPOINT_URL: &str = "https://storage.googleapis.com";

/// Configuration for the bucket client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint
    pub endpoint_url: String,
    /// HMAC access key ID
    pub access_key_id: String,
    /// HMAC secret
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (Cloud Storage accepts "auto")
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT_URL.to_string()),
            access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STORAGE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STORAGE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STORAGE_BUCKET")
                .map_err(|_| StorageError::config_error("STORAGE_BUCKET not set"))?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Bucket storage client.
#[derive(Clone)]
pub struct BucketClient {
    client: Client,
    bucket: String,
}

impl BucketClient {
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vchain-storage",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    /// Upload bytes.
    pub async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        let size = data.len();
        debug!("Uploading {} bytes to {}", size, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!(key = %key, bytes = size, "Uploaded object");
        Ok(())
    }

    /// Download an object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Generate a presigned GET URL.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// List objects under a prefix, following continuation tokens.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                });
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    /// Check connectivity with a head-bucket call.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("bucket connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

#[async_trait]
impl BlobStore for BucketClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn save(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        self.upload_bytes(data, key, content_type).await?;
        Ok(self.object_uri(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.download_bytes(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .list_objects(prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.presign_get(key, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_requires_bucket() {
        std::env::set_var("STORAGE_ACCESS_KEY_ID", "k");
        std::env::set_var("STORAGE_SECRET_ACCESS_KEY", "s");
        std::env::remove_var("STORAGE_BUCKET");
        assert!(StorageConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_defaults_to_gcs_endpoint() {
        std::env::set_var("STORAGE_ACCESS_KEY_ID", "k");
        std::env::set_var("STORAGE_SECRET_ACCESS_KEY", "s");
        std::env::set_var("STORAGE_BUCKET", "videos-bucket");
        std::env::remove_var("STORAGE_ENDPOINT_URL");
        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(config.region, "auto");

        let client = BucketClient::new(config);
        assert_eq!(client.object_uri("videos/u/a.mp4"), "gs://videos-bucket/videos/u/a.mp4");
        std::env::remove_var("STORAGE_BUCKET");
    }
}
