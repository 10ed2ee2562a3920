//! Worker configuration.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Queue consumption settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often to reclaim messages abandoned by crashed workers
    pub claim_interval: Duration,
    /// How often to re-publish suspended jobs that are due
    pub promote_interval: Duration,
    /// How often a running job refreshes its queue message
    pub heartbeat_interval: Duration,
    /// Port of the Prometheus scrape endpoint
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            promote_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
            metrics_port: 9091,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", defaults.max_concurrent_jobs).max(1),
            shutdown_timeout: Duration::from_secs(env_or(
                "WORKER_SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout.as_secs(),
            )),
            claim_interval: Duration::from_secs(env_or(
                "WORKER_CLAIM_INTERVAL_SECS",
                defaults.claim_interval.as_secs(),
            )),
            promote_interval: Duration::from_secs(env_or(
                "WORKER_PROMOTE_INTERVAL_SECS",
                defaults.promote_interval.as_secs(),
            )),
            heartbeat_interval: Duration::from_secs(env_or(
                "WORKER_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            metrics_port: env_or("WORKER_METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Heartbeat period for a queue that reclaims messages idle for
    /// `visibility_timeout`. Capped at a third of that window.
    pub fn heartbeat_for(&self, visibility_timeout: Duration) -> Duration {
        self.heartbeat_interval
            .min(visibility_timeout / 3)
            .max(Duration::from_millis(100))
    }
}

/// Timing budgets of the generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Requested length of each generated clip
    pub segment_duration_secs: u32,
    pub segment_max_poll_attempts: u32,
    pub segment_poll_interval: Duration,
    /// Preferred timestamp of the continuity frame
    pub frame_offset_secs: f64,
    pub frame_max_poll_attempts: u32,
    pub frame_poll_interval: Duration,
    /// Whole-extraction attempts before giving up on continuity
    pub frame_extraction_attempts: u32,
    pub stitch_max_poll_attempts: u32,
    pub stitch_poll_interval: Duration,
    /// Lifetime of the final video's signed URL
    pub signed_url_ttl: Duration,
    /// Longest wait served in-process; longer waits suspend the job
    pub inline_sleep_max: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 5,
            segment_max_poll_attempts: 60,
            segment_poll_interval: Duration::from_secs(5),
            frame_offset_secs: 4.5,
            frame_max_poll_attempts: 20,
            frame_poll_interval: Duration::from_secs(2),
            frame_extraction_attempts: 2,
            stitch_max_poll_attempts: 60,
            stitch_poll_interval: Duration::from_secs(10),
            signed_url_ttl: Duration::from_secs(7 * 24 * 3600),
            inline_sleep_max: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            segment_duration_secs: env_or("SEGMENT_DURATION_SECS", d.segment_duration_secs).max(1),
            segment_max_poll_attempts: env_or("SEGMENT_MAX_POLL_ATTEMPTS", d.segment_max_poll_attempts),
            segment_poll_interval: Duration::from_secs(env_or(
                "SEGMENT_POLL_INTERVAL_SECS",
                d.segment_poll_interval.as_secs(),
            )),
            frame_offset_secs: env_or("FRAME_OFFSET_SECS", d.frame_offset_secs),
            frame_max_poll_attempts: env_or("FRAME_MAX_POLL_ATTEMPTS", d.frame_max_poll_attempts),
            frame_poll_interval: Duration::from_secs(env_or(
                "FRAME_POLL_INTERVAL_SECS",
                d.frame_poll_interval.as_secs(),
            )),
            frame_extraction_attempts: env_or("FRAME_EXTRACTION_ATTEMPTS", d.frame_extraction_attempts).max(1),
            stitch_max_poll_attempts: env_or("STITCH_MAX_POLL_ATTEMPTS", d.stitch_max_poll_attempts),
            stitch_poll_interval: Duration::from_secs(env_or(
                "STITCH_POLL_INTERVAL_SECS",
                d.stitch_poll_interval.as_secs(),
            )),
            signed_url_ttl: Duration::from_secs(env_or("SIGNED_URL_TTL_SECS", d.signed_url_ttl.as_secs())),
            inline_sleep_max: Duration::from_secs(env_or(
                "STEP_INLINE_SLEEP_MAX_SECS",
                d.inline_sleep_max.as_secs(),
            )),
        }
    }

    /// Frame timestamp, kept half a second inside the clip.
    pub fn frame_offset(&self) -> f64 {
        self.frame_offset_secs
            .min(self.segment_duration_secs as f64 - 0.5)
            .max(0.0)
    }

    /// Budgets small enough for tests to run in milliseconds.
    pub fn fast() -> Self {
        Self {
            segment_max_poll_attempts: 5,
            segment_poll_interval: Duration::from_millis(1),
            frame_max_poll_attempts: 3,
            frame_poll_interval: Duration::from_millis(1),
            stitch_max_poll_attempts: 5,
            stitch_poll_interval: Duration::from_millis(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_frame_offset_is_capped() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.frame_offset(), 4.5);

        config.frame_offset_secs = 9.0;
        assert_eq!(config.frame_offset(), 4.5);

        config.segment_duration_secs = 8;
        assert_eq!(config.frame_offset(), 7.5);
    }

    #[test]
    #[serial]
    fn test_pipeline_config_from_env() {
        std::env::set_var("SEGMENT_MAX_POLL_ATTEMPTS", "12");
        std::env::set_var("STITCH_POLL_INTERVAL_SECS", "not-a-number");
        let config = PipelineConfig::from_env();
        assert_eq!(config.segment_max_poll_attempts, 12);
        assert_eq!(config.stitch_poll_interval, Duration::from_secs(10));
        assert_eq!(config.signed_url_ttl, Duration::from_secs(604_800));
        std::env::remove_var("SEGMENT_MAX_POLL_ATTEMPTS");
        std::env::remove_var("STITCH_POLL_INTERVAL_SECS");
    }

    #[test]
    #[serial]
    fn test_worker_config_defaults() {
        std::env::remove_var("WORKER_MAX_JOBS");
        assert_eq!(WorkerConfig::from_env().max_concurrent_jobs, 2);
    }

    #[test]
    fn test_heartbeat_stays_inside_reclaim_window() {
        let visibility = vchain_queue::QueueConfig::default().visibility_timeout;
        let config = WorkerConfig::default();
        assert!(config.heartbeat_for(visibility) < visibility);

        let slow = WorkerConfig {
            heartbeat_interval: Duration::from_secs(3600),
            ..WorkerConfig::default()
        };
        assert_eq!(slow.heartbeat_for(Duration::from_secs(90)), Duration::from_secs(30));
        assert!(slow.heartbeat_for(visibility) < visibility);
    }

    #[test]
    #[serial]
    fn test_heartbeat_from_env() {
        std::env::set_var("WORKER_HEARTBEAT_SECS", "15");
        assert_eq!(WorkerConfig::from_env().heartbeat_interval, Duration::from_secs(15));
        std::env::remove_var("WORKER_HEARTBEAT_SECS");
    }
}
