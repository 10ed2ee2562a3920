//! Queue executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vchain_queue::{GenerateVideoJob, JobQueue};

use crate::config::WorkerConfig;
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{fail_job, run_pipeline, PipelineOutcome};

/// Consumes generation jobs and drives them through the pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<PipelineContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
    heartbeat: Duration,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: PipelineContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        let heartbeat = config.heartbeat_for(queue.visibility_timeout());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
            heartbeat,
        }
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Start the executor and run until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claimer();
        let promote_task = self.spawn_promoter();

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();
        promote_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running at shutdown; they will be reclaimed");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically reclaim messages abandoned by crashed workers.
    fn spawn_claimer(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let heartbeat = self.heartbeat;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let jobs = match queue.claim_pending(&consumer_name, 5).await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        warn!("Failed to claim pending jobs: {}", e);
                        continue;
                    }
                };
                if !jobs.is_empty() {
                    info!("Claimed {} pending jobs", jobs.len());
                }
                for (message_id, job) in jobs {
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        return;
                    };
                    let ctx = Arc::clone(&ctx);
                    let queue = Arc::clone(&queue);
                    let delivery = Delivery {
                        consumer_name: consumer_name.clone(),
                        message_id,
                        heartbeat,
                    };
                    tokio::spawn(async move {
                        let _permit = permit;
                        execute_job(ctx, queue, delivery, job).await;
                    });
                }
            }
        })
    }

    /// Periodically re-publish suspended jobs whose wake-up time has passed.
    fn spawn_promoter(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let interval = self.config.promote_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = queue.promote_due(50).await {
                    warn!("Failed to promote delayed jobs: {}", e);
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("job semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let delivery = Delivery {
                consumer_name: self.consumer_name.clone(),
                message_id,
                heartbeat: self.heartbeat,
            };

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(ctx, queue, delivery, job).await;
            });
        }

        Ok(())
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// A message being worked on by this consumer.
struct Delivery {
    consumer_name: String,
    message_id: String,
    heartbeat: Duration,
}

/// Keep refreshing the message's idle time until aborted.
fn spawn_heartbeat(queue: Arc<JobQueue>, delivery: &Delivery) -> tokio::task::JoinHandle<()> {
    let consumer_name = delivery.consumer_name.clone();
    let message_id = delivery.message_id.clone();
    let every = delivery.heartbeat;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = queue.touch(&consumer_name, &message_id).await {
                warn!(message_id = %message_id, "Failed to refresh message: {}", e);
            }
        }
    })
}

/// Run one delivery of a job and settle its message.
async fn execute_job(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>, delivery: Delivery, job: GenerateVideoJob) {
    let job_id = job.job_id.clone();
    let message_id = delivery.message_id.as_str();
    info!(job_id = %job_id, resumptions = job.resumptions, "Executing job");

    let heartbeat = spawn_heartbeat(Arc::clone(&queue), &delivery);
    let result = run_pipeline(&ctx, &job_id).await;
    heartbeat.abort();

    match result {
        Ok(PipelineOutcome::Suspended { resume_at }) => {
            if let Err(e) = queue.schedule(message_id, &job, resume_at).await {
                error!(job_id = %job_id, "Failed to schedule resumption: {}", e);
            }
        }
        Ok(outcome) => {
            debug!(job_id = %job_id, ?outcome, "Job settled");
            settle(&queue, message_id, &job).await;
        }
        Err(e) => {
            error!(job_id = %job_id, "Job attempt failed: {}", e);

            let retry_count = queue.increment_retry(message_id).await.unwrap_or(u32::MAX);
            let max_retries = queue.max_retries();
            if retry_count < max_retries {
                info!(
                    job_id = %job_id,
                    "Job will be retried (attempt {}/{})", retry_count, max_retries
                );
                return;
            }

            warn!(job_id = %job_id, "Job exceeded max retries ({}), moving to DLQ", max_retries);
            let message = format!("Job failed after {} attempts: {}", max_retries, e);
            if let Err(e) = fail_job(&ctx, &job_id, &message).await {
                error!(job_id = %job_id, "Failed to mark job failed: {}", e);
            }
            if let Err(e) = queue.dlq(message_id, &job, &message).await {
                error!(job_id = %job_id, "Failed to move job to DLQ: {}", e);
            }
            if let Err(e) = queue.clear_dedup(&job).await {
                warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
            }
        }
    }
}

async fn settle(queue: &JobQueue, message_id: &str, job: &GenerateVideoJob) {
    if let Err(e) = queue.ack(message_id).await {
        error!(job_id = %job.job_id, "Failed to ack job: {}", e);
    }
    if let Err(e) = queue.clear_dedup(job).await {
        warn!(job_id = %job.job_id, "Failed to clear dedup key: {}", e);
    }
}
