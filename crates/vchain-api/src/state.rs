//! Application state.

use std::sync::Arc;

use tracing::warn;

use vchain_firestore::{FirestoreClient, InMemoryJobStore, JobRepository, JobStore};
use vchain_queue::{JobPublisher, JobQueue};

use crate::config::ApiConfig;
use crate::middleware::ClientRateLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn JobStore>,
    pub publisher: Arc<dyn JobPublisher>,
    /// Present when publishing to Redis; probed by the readiness check
    pub queue: Option<Arc<JobQueue>>,
    pub rate_limiter: ClientRateLimiter,
}

impl AppState {
    /// State over explicit collaborators.
    pub fn new(config: ApiConfig, jobs: Arc<dyn JobStore>, publisher: Arc<dyn JobPublisher>) -> Self {
        let rate_limiter = ClientRateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);
        Self {
            config,
            jobs,
            publisher,
            queue: None,
            rate_limiter,
        }
    }

    /// Create application state from the environment.
    ///
    /// `STORE_BACKEND=memory` keeps job records in process.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let jobs: Arc<dyn JobStore> = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => {
                warn!("Using in-memory job store; records are not visible to workers in other processes");
                Arc::new(InMemoryJobStore::new())
            }
            _ => Arc::new(JobRepository::new(FirestoreClient::from_env().await?)),
        };

        let queue = Arc::new(JobQueue::from_env()?);

        let mut state = Self::new(config, jobs, queue.clone());
        state.queue = Some(queue);
        Ok(state)
    }
}
