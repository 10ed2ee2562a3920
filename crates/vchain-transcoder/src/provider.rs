//! Transcoding provider abstraction.

use async_trait::async_trait;

use crate::error::TranscoderResult;
use crate::types::{ConcatenationRequest, ExtractionRequest, JobPoll, TranscoderJobHandle};

/// A service that runs asynchronous media jobs against bucket objects.
#[async_trait]
pub trait TranscodingProvider: Send + Sync {
    async fn create_extraction_job(&self, request: &ExtractionRequest) -> TranscoderResult<TranscoderJobHandle>;

    async fn create_concatenation_job(
        &self,
        request: &ConcatenationRequest,
    ) -> TranscoderResult<TranscoderJobHandle>;

    async fn poll_job(&self, handle: &TranscoderJobHandle) -> TranscoderResult<JobPoll>;
}
