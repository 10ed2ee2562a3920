//! Structured job logging.

use tracing::{error, info, warn, Span};
use vchain_models::JobId;

/// Logs job lifecycle events with `job_id` and `operation` fields attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = %self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, operation = %self.operation, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the job fields, for instrumenting whole stages.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = %self.operation)
    }
}
