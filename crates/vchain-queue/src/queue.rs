//! Job queue using Redis Streams.

use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::GenerateVideoJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Sorted set holding suspended jobs, scored by resume time (ms)
    pub delayed_set_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Idle time after which another worker may claim a delivered message
    pub visibility_timeout: Duration,
    /// Lifetime of the duplicate-enqueue guard
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vchain:jobs".to_string(),
            consumer_group: "vchain:workers".to_string(),
            dlq_stream_name: "vchain:dlq".to_string(),
            delayed_set_name: "vchain:delayed".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600),
            dedup_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            delayed_set_name: std::env::var("QUEUE_DELAYED_SET").unwrap_or(defaults.delayed_set_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            dedup_ttl: defaults.dedup_ttl,
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Round-trip to Redis.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    fn dedup_key(job: &GenerateVideoJob) -> String {
        format!("vchain:dedup:{}", job.idempotency_key())
    }

    /// Enqueue a new job, rejecting one whose record is already queued.
    pub async fn enqueue(&self, job: GenerateVideoJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let dedup_key = Self::dedup_key(&job);
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!("Duplicate job rejected: {}", job.idempotency_key());
            return Err(QueueError::Duplicate(job.idempotency_key()));
        }

        match self.add_to_stream(&mut conn, &job).await {
            Ok(id) => Ok(id),
            Err(e) => {
                conn.del::<_, ()>(&dedup_key).await.ok();
                Err(e)
            }
        }
    }

    async fn add_to_stream(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &GenerateVideoJob,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(job.idempotency_key())
            .query_async(conn)
            .await?;

        info!("Enqueued job {} with message ID {}", job.job_id, message_id);
        Ok(message_id)
    }

    /// Drop the duplicate guard once a job has reached a final outcome.
    pub async fn clear_dedup(&self, job: &GenerateVideoJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(Self::dedup_key(job)).await?;
        Ok(())
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(Self::retry_key(message_id)).await.ok();

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &GenerateVideoJob, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved job {} to DLQ: {}", job.job_id, error);
        Ok(())
    }

    /// Park a suspended job until `resume_at`, acknowledging its message.
    pub async fn schedule(
        &self,
        message_id: &str,
        job: &GenerateVideoJob,
        resume_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job.resumed())?;

        conn.zadd::<_, _, _, ()>(&self.config.delayed_set_name, &payload, resume_at.timestamp_millis())
            .await?;
        self.ack(message_id).await?;

        info!(job_id = %job.job_id, %resume_at, "Scheduled job resumption");
        Ok(())
    }

    /// Move due suspended jobs back onto the stream.
    ///
    /// Each entry is removed before it is re-added, so concurrent promoters
    /// deliver it once.
    pub async fn promote_due(&self, count: usize) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(&self.config.delayed_set_name, "-inf", now, 0, count as isize)
            .await?;

        let mut promoted = 0;
        for payload in due {
            let removed: i64 = conn.zrem(&self.config.delayed_set_name, &payload).await?;
            if removed == 0 {
                continue;
            }
            match serde_json::from_str::<GenerateVideoJob>(&payload) {
                Ok(job) => {
                    self.add_to_stream(&mut conn, &job).await?;
                    promoted += 1;
                }
                Err(e) => warn!("Dropping malformed delayed job: {}", e),
            }
        }

        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    /// Number of suspended jobs waiting to resume.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(&self.config.delayed_set_name).await?)
    }

    /// Read new messages for this consumer.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, GenerateVideoJob)>> {
        let mut conn = self.conn().await?;

        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        Ok(self.decode_entries(entries, "consumed").await)
    }

    /// Claim messages another consumer left unacknowledged for too long.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, GenerateVideoJob)>> {
        let mut conn = self.conn().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok(self.decode_entries(reply.claimed, "claimed").await)
    }

    /// Reset the idle time of a message this consumer is still working on,
    /// keeping it out of reach of `claim_pending`.
    pub async fn touch(&self, consumer_name: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let _: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn decode_entries(&self, entries: Vec<StreamId>, action: &str) -> Vec<(String, GenerateVideoJob)> {
        let mut jobs = Vec::new();
        for entry in entries {
            let parsed = entry
                .get::<String>("job")
                .map(|payload| serde_json::from_str::<GenerateVideoJob>(&payload));
            match parsed {
                Some(Ok(job)) => {
                    debug!("Job {} {} from stream", job.job_id, action);
                    jobs.push((entry.id, job));
                }
                Some(Err(e)) => {
                    warn!("Failed to parse job payload: {}", e);
                    self.ack(&entry.id).await.ok();
                }
                None => {
                    warn!("Stream entry {} has no job payload", entry.id);
                    self.ack(&entry.id).await.ok();
                }
            }
        }
        jobs
    }

    fn retry_key(message_id: &str) -> String {
        format!("vchain:retry:{}", message_id)
    }

    /// Increment and return the failure count of a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = Self::retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.config.visibility_timeout
    }
}
