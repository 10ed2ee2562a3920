//! In-memory blob store for tests and local runs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Blob store backed by a sorted map.
pub struct InMemoryBlobStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, (Vec<u8>, String)>>,
}

impl InMemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert an object directly.
    pub async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn save(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        self.put(key, data, content_type).await;
        Ok(self.object_uri(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        if !self.contains(key).await {
            return Err(StorageError::not_found(key));
        }
        Ok(format!(
            "https://storage.local/{}/{}?expires_in={}",
            self.bucket,
            key,
            ttl.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_returns_gs_uri() {
        let store = InMemoryBlobStore::new("bucket");
        let uri = store.save("videos/u/a.mp4", vec![1, 2], "video/mp4").await.unwrap();
        assert_eq!(uri, "gs://bucket/videos/u/a.mp4");
        assert_eq!(store.key_from_uri(&uri).unwrap(), "videos/u/a.mp4");
        assert!(store.key_from_uri("gs://other/videos/u/a.mp4").is_err());
    }

    #[tokio::test]
    async fn test_list_by_prefix_sorted() {
        let store = InMemoryBlobStore::new("bucket");
        store.put("frames/u/s/frame_0001.jpeg", vec![], "image/jpeg").await;
        store.put("frames/u/s/frame_0000.jpeg", vec![], "image/jpeg").await;
        store.put("frames/u/t/frame_0000.jpeg", vec![], "image/jpeg").await;

        let keys = store.list("frames/u/s/frame_").await.unwrap();
        assert_eq!(keys, vec!["frames/u/s/frame_0000.jpeg", "frames/u/s/frame_0001.jpeg"]);
    }

    #[tokio::test]
    async fn test_signed_url_requires_object() {
        let store = InMemoryBlobStore::new("bucket");
        assert!(store.signed_url("missing", Duration::from_secs(60)).await.is_err());
    }
}
