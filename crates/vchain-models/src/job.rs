//! Long-form video job records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::options::GenerationOptions;
use crate::request::LongFormRequest;

/// Organization assigned when the caller does not name one.
pub const DEFAULT_ORGANIZATION_ID: &str = "personal";

/// Length of every generated segment in seconds.
pub const SEGMENT_DURATION_SECS: f64 = 5.0;

/// Caller-supplied identifier of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of segment `index` of a job.
pub fn segment_id(job_id: &JobId, index: usize) -> String {
    format!("{}_seg_{}", job_id, index)
}

/// Job lifecycle status.
///
/// `queued -> processing -> stitching -> completed`, with `failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, waiting for a worker
    #[default]
    Queued,
    /// Segments are being generated
    Processing,
    /// Segments are being concatenated
    Stitching,
    /// Final video available
    Completed,
    /// Job halted with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Stitching => "stitching",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the stored representation. Unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "stitching" => Some(JobStatus::Stitching),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed => true,
            _ => next.rank() > self.rank(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Stitching => 2,
            JobStatus::Completed => 3,
            JobStatus::Failed => 4,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress percentage after `completed` of `total` segments.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed.min(total) as u64 * 100) / total as u64;
    pct as u8
}

/// Technical metadata of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputMetadata {
    pub duration_seconds: f64,
    pub fps: u32,
    pub mime_type: String,
    pub resolution: String,
}

/// Final video reference written on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoOutput {
    pub url: String,
    pub metadata: OutputMetadata,
}

/// Long-form video job stored in the job record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    /// Job ID (document ID)
    pub id: JobId,

    /// Owning user
    pub owner_id: String,

    /// Owning organization
    pub organization_id: String,

    /// One prompt per segment, in playback order
    pub prompts: Vec<String>,

    /// Generation options
    #[serde(default)]
    pub options: GenerationOptions,

    /// Optional first-segment start image (raw base64 or data URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_image: Option<String>,

    /// Caller's duration hint in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,

    /// Lifecycle status
    pub status: JobStatus,

    pub total_segments: u32,
    pub completed_segments: u32,

    /// 0-100
    pub progress: u8,

    /// URIs of completed segments, in order
    #[serde(default)]
    pub segment_urls: Vec<String>,

    /// Signed URL of the final video (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Failure message (failed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Human-readable sub-phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Non-fatal problems encountered while processing
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Provider handle of the stitch job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcoder_job_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<VideoOutput>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VideoJob {
    /// Build the initial `queued` record for a validated request.
    pub fn queued(request: &LongFormRequest) -> Self {
        let now = Utc::now();
        let total = request.prompts.len() as u32;
        Self {
            id: JobId::from_string(request.job_id.trim()),
            owner_id: request.owner_id.trim().to_string(),
            organization_id: request
                .organization_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_ORGANIZATION_ID)
                .to_string(),
            prompts: request.prompts.clone(),
            options: request.options.clone().unwrap_or_default(),
            start_image: request.start_image.clone(),
            total_duration: request.total_duration,
            status: JobStatus::Queued,
            total_segments: total,
            completed_segments: 0,
            progress: 0,
            segment_urls: Vec::new(),
            video_url: None,
            error: None,
            current_step: None,
            warnings: Vec::new(),
            transcoder_job_name: None,
            output: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Duration of the stitched output in seconds.
    pub fn output_duration_secs(&self) -> f64 {
        self.total_segments as f64 * SEGMENT_DURATION_SECS
    }
}

/// Partial update of a job record.
///
/// Only the fields that are set are written; everything else on the
/// record is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub completed_segments: Option<u32>,
    pub progress: Option<u8>,
    pub segment_urls: Option<Vec<String>>,
    pub video_url: Option<String>,
    pub error: Option<String>,
    pub current_step: Option<String>,
    pub warnings: Option<Vec<String>>,
    pub transcoder_job_name: Option<String>,
    pub output: Option<VideoOutput>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn completed_segments(mut self, completed: u32) -> Self {
        self.completed_segments = Some(completed);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn segment_urls(mut self, urls: Vec<String>) -> Self {
        self.segment_urls = Some(urls);
        self
    }

    pub fn video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = Some(warnings);
        self
    }

    pub fn transcoder_job_name(mut self, name: impl Into<String>) -> Self {
        self.transcoder_job_name = Some(name.into());
        self
    }

    pub fn output(mut self, output: VideoOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this update to an in-memory record.
    pub fn apply_to(&self, job: &mut VideoJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(completed) = self.completed_segments {
            job.completed_segments = completed;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(urls) = &self.segment_urls {
            job.segment_urls = urls.clone();
        }
        if let Some(url) = &self.video_url {
            job.video_url = Some(url.clone());
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
        if let Some(step) = &self.current_step {
            job.current_step = Some(step.clone());
        }
        if let Some(warnings) = &self.warnings {
            job.warnings = warnings.clone();
        }
        if let Some(name) = &self.transcoder_job_name {
            job.transcoder_job_name = Some(name.clone());
        }
        if let Some(output) = &self.output {
            job.output = Some(output.clone());
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        job.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompts: &[&str]) -> LongFormRequest {
        LongFormRequest {
            job_id: "job-1".to_string(),
            owner_id: "user-1".to_string(),
            prompts: prompts.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Stitching));
        assert!(Stitching.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Failed));
        assert!(Stitching.can_transition_to(Failed));

        assert!(!Stitching.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Stitching,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("generating"), None);
    }

    #[test]
    fn test_progress_percent_floors() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn test_queued_job_defaults() {
        let job = VideoJob::queued(&request(&["a", "b", "c"]));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.total_segments, 3);
        assert_eq!(job.completed_segments, 0);
        assert_eq!(job.organization_id, DEFAULT_ORGANIZATION_ID);
        assert!(job.segment_urls.is_empty());
        assert!(job.video_url.is_none());
        assert_eq!(job.output_duration_secs(), 15.0);
    }

    #[test]
    fn test_update_touches_only_set_fields() {
        let mut job = VideoJob::queued(&request(&["a", "b"]));
        job.current_step = Some("generating segment 1/2".to_string());

        JobUpdate::new()
            .completed_segments(1)
            .progress(50)
            .segment_urls(vec!["gs://b/seg0.mp4".to_string()])
            .apply_to(&mut job);

        assert_eq!(job.completed_segments, 1);
        assert_eq!(job.progress, 50);
        assert_eq!(job.segment_urls.len(), 1);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.current_step.as_deref(), Some("generating segment 1/2"));
    }

    #[test]
    fn test_segment_id_format() {
        assert_eq!(segment_id(&JobId::from("abc"), 2), "abc_seg_2");
    }
}
