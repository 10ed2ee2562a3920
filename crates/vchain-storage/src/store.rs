//! Blob storage trait used by the pipeline.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Object storage for segments, frames and final videos.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the backing bucket.
    fn bucket(&self) -> &str;

    /// Store `data` at `key` and return its `gs://` URI.
    async fn save(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Time-limited download URL for `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// `gs://bucket/key` URI of an object in this bucket.
    fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket(), key.trim_start_matches('/'))
    }

    /// Object key of a `gs://` URI that points into this bucket.
    fn key_from_uri(&self, uri: &str) -> StorageResult<String> {
        let prefix = format!("gs://{}/", self.bucket());
        uri.strip_prefix(&prefix)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StorageError::invalid_key(format!("{} is not in bucket {}", uri, self.bucket())))
    }
}
