//! Generation provider abstraction.

use async_trait::async_trait;

use crate::error::VeoResult;
use crate::types::{GenerationRequest, OperationHandle, OperationStatus};

/// A service that generates a video clip as a long-running operation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start a generation. A rejection is returned as an error.
    async fn start_generation(&self, request: &GenerationRequest) -> VeoResult<OperationHandle>;

    /// Current state of an operation. Transient lookup failures are
    /// reported as not done.
    async fn poll_operation(&self, handle: &OperationHandle) -> VeoResult<OperationStatus>;

    /// Fetch the bytes of a provider-hosted video.
    async fn download_video(&self, uri: &str) -> VeoResult<Vec<u8>>;
}
