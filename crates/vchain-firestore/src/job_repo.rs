//! Job record repository (`video_jobs` collection).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vchain_models::{
    AspectRatio, GenerationOptions, JobId, JobStatus, JobUpdate, OutputMetadata, VideoJob,
    VideoOutput,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::JobStore;
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

/// Collection holding job records.
pub const JOBS_COLLECTION: &str = "video_jobs";

/// Firestore-backed job record store.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
}

impl JobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, job: &VideoJob) -> FirestoreResult<()> {
        let fields = job_to_fields(job);
        self.client
            .with_retry("create_job", || {
                self.client
                    .create_document(JOBS_COLLECTION, job.id.as_str(), fields.clone())
            })
            .await?;
        info!(job_id = %job.id, segments = job.total_segments, "Created job record");
        Ok(())
    }

    async fn merge(&self, id: &JobId, update: &JobUpdate) -> FirestoreResult<()> {
        let (fields, mask) = update_to_fields(update, Utc::now());
        self.client
            .with_retry("merge_job", || {
                self.client
                    .update_document(JOBS_COLLECTION, id.as_str(), fields.clone(), mask.clone())
            })
            .await?;
        debug!(job_id = %id, fields = ?mask, "Merged job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<VideoJob> {
        let doc = self
            .client
            .with_retry("get_job", || self.client.get_document(JOBS_COLLECTION, id.as_str()))
            .await?
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", JOBS_COLLECTION, id)))?;
        document_to_job(&doc, id)
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn options_to_value(options: &GenerationOptions) -> Value {
    let mut fields = HashMap::new();
    fields.insert(
        "aspect_ratio".to_string(),
        options.aspect_ratio.as_str().to_firestore_value(),
    );
    if let Some(resolution) = &options.resolution {
        fields.insert("resolution".to_string(), resolution.to_firestore_value());
    }
    if let Some(seed) = options.seed {
        fields.insert("seed".to_string(), seed.to_firestore_value());
    }
    if let Some(negative) = &options.negative_prompt {
        fields.insert("negative_prompt".to_string(), negative.to_firestore_value());
    }
    if let Some(audio) = options.generate_audio {
        fields.insert("generate_audio".to_string(), audio.to_firestore_value());
    }
    Value::map(fields)
}

fn value_to_options(value: Option<&Value>) -> GenerationOptions {
    let Some(fields) = value.and_then(Value::as_map) else {
        return GenerationOptions::default();
    };
    let get = |key: &str| fields.get(key);

    GenerationOptions {
        aspect_ratio: get("aspect_ratio")
            .and_then(String::from_firestore_value)
            .and_then(|s| s.parse::<AspectRatio>().ok())
            .unwrap_or_default(),
        resolution: get("resolution").and_then(String::from_firestore_value),
        seed: get("seed").and_then(i64::from_firestore_value),
        negative_prompt: get("negative_prompt").and_then(String::from_firestore_value),
        generate_audio: get("generate_audio").and_then(bool::from_firestore_value),
    }
}

fn output_to_value(output: &VideoOutput) -> Value {
    let mut metadata = HashMap::new();
    metadata.insert(
        "duration_seconds".to_string(),
        output.metadata.duration_seconds.to_firestore_value(),
    );
    metadata.insert("fps".to_string(), output.metadata.fps.to_firestore_value());
    metadata.insert(
        "mime_type".to_string(),
        output.metadata.mime_type.to_firestore_value(),
    );
    metadata.insert(
        "resolution".to_string(),
        output.metadata.resolution.to_firestore_value(),
    );

    let mut fields = HashMap::new();
    fields.insert("url".to_string(), output.url.to_firestore_value());
    fields.insert("metadata".to_string(), Value::map(metadata));
    Value::map(fields)
}

fn value_to_output(value: Option<&Value>) -> Option<VideoOutput> {
    let fields = value.and_then(Value::as_map)?;
    let url = fields.get("url").and_then(String::from_firestore_value)?;
    let meta = fields.get("metadata").and_then(Value::as_map);
    let meta_get = |key: &str| meta.and_then(|m| m.get(key));

    Some(VideoOutput {
        url,
        metadata: OutputMetadata {
            duration_seconds: meta_get("duration_seconds")
                .and_then(f64::from_firestore_value)
                .unwrap_or(0.0),
            fps: meta_get("fps").and_then(u32::from_firestore_value).unwrap_or(0),
            mime_type: meta_get("mime_type")
                .and_then(String::from_firestore_value)
                .unwrap_or_default(),
            resolution: meta_get("resolution")
                .and_then(String::from_firestore_value)
                .unwrap_or_default(),
        },
    })
}

/// Full field set of a new record.
pub fn job_to_fields(job: &VideoJob) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), job.id.as_str().to_firestore_value());
    fields.insert("owner_id".to_string(), job.owner_id.to_firestore_value());
    fields.insert(
        "organization_id".to_string(),
        job.organization_id.to_firestore_value(),
    );
    fields.insert("prompts".to_string(), job.prompts.to_firestore_value());
    fields.insert("options".to_string(), options_to_value(&job.options));
    if let Some(image) = &job.start_image {
        fields.insert("start_image".to_string(), image.to_firestore_value());
    }
    if let Some(duration) = job.total_duration {
        fields.insert("total_duration".to_string(), duration.to_firestore_value());
    }
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    fields.insert(
        "total_segments".to_string(),
        job.total_segments.to_firestore_value(),
    );
    fields.insert(
        "completed_segments".to_string(),
        job.completed_segments.to_firestore_value(),
    );
    fields.insert("progress".to_string(), job.progress.to_firestore_value());
    fields.insert("segment_urls".to_string(), job.segment_urls.to_firestore_value());
    fields.insert("warnings".to_string(), job.warnings.to_firestore_value());
    if let Some(url) = &job.video_url {
        fields.insert("video_url".to_string(), url.to_firestore_value());
    }
    if let Some(error) = &job.error {
        fields.insert("error".to_string(), error.to_firestore_value());
    }
    if let Some(step) = &job.current_step {
        fields.insert("current_step".to_string(), step.to_firestore_value());
    }
    if let Some(name) = &job.transcoder_job_name {
        fields.insert("transcoder_job_name".to_string(), name.to_firestore_value());
    }
    if let Some(output) = &job.output {
        fields.insert("output".to_string(), output_to_value(output));
    }
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), job.updated_at.to_firestore_value());
    if let Some(at) = job.completed_at {
        fields.insert("completed_at".to_string(), at.to_firestore_value());
    }
    fields
}

/// Fields and update mask for a partial update.
pub fn update_to_fields(
    update: &JobUpdate,
    now: DateTime<Utc>,
) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::new();

    if let Some(status) = update.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
    }
    if let Some(completed) = update.completed_segments {
        fields.insert("completed_segments".to_string(), completed.to_firestore_value());
    }
    if let Some(progress) = update.progress {
        fields.insert("progress".to_string(), progress.to_firestore_value());
    }
    if let Some(urls) = &update.segment_urls {
        fields.insert("segment_urls".to_string(), urls.to_firestore_value());
    }
    if let Some(url) = &update.video_url {
        fields.insert("video_url".to_string(), url.to_firestore_value());
    }
    if let Some(error) = &update.error {
        fields.insert("error".to_string(), error.to_firestore_value());
    }
    if let Some(step) = &update.current_step {
        fields.insert("current_step".to_string(), step.to_firestore_value());
    }
    if let Some(warnings) = &update.warnings {
        fields.insert("warnings".to_string(), warnings.to_firestore_value());
    }
    if let Some(name) = &update.transcoder_job_name {
        fields.insert("transcoder_job_name".to_string(), name.to_firestore_value());
    }
    if let Some(output) = &update.output {
        fields.insert("output".to_string(), output_to_value(output));
    }
    if let Some(at) = update.completed_at {
        fields.insert("completed_at".to_string(), at.to_firestore_value());
    }
    fields.insert("updated_at".to_string(), now.to_firestore_value());

    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    (fields, mask)
}

/// Decode a stored record.
pub fn document_to_job(doc: &Document, id: &JobId) -> FirestoreResult<VideoJob> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::invalid_response("Document has no fields"))?;

    let get_string = |key: &str| fields.get(key).and_then(String::from_firestore_value);
    let get_u32 = |key: &str| fields.get(key).and_then(u32::from_firestore_value).unwrap_or(0);
    let get_time = |key: &str| fields.get(key).and_then(DateTime::<Utc>::from_firestore_value);
    let get_strings = |key: &str| {
        fields
            .get(key)
            .and_then(Vec::<String>::from_firestore_value)
            .unwrap_or_default()
    };

    let status_raw = get_string("status").unwrap_or_default();
    let status = JobStatus::parse(&status_raw).ok_or_else(|| {
        FirestoreError::invalid_response(format!("Unknown job status '{}'", status_raw))
    })?;

    Ok(VideoJob {
        id: id.clone(),
        owner_id: get_string("owner_id").unwrap_or_default(),
        organization_id: get_string("organization_id").unwrap_or_default(),
        prompts: get_strings("prompts"),
        options: value_to_options(fields.get("options")),
        start_image: get_string("start_image"),
        total_duration: fields.get("total_duration").and_then(f64::from_firestore_value),
        status,
        total_segments: get_u32("total_segments"),
        completed_segments: get_u32("completed_segments"),
        progress: fields
            .get("progress")
            .and_then(u8::from_firestore_value)
            .unwrap_or(0),
        segment_urls: get_strings("segment_urls"),
        video_url: get_string("video_url"),
        error: get_string("error"),
        current_step: get_string("current_step"),
        warnings: get_strings("warnings"),
        transcoder_job_name: get_string("transcoder_job_name"),
        output: value_to_output(fields.get("output")),
        created_at: get_time("created_at").unwrap_or_else(Utc::now),
        updated_at: get_time("updated_at").unwrap_or_else(Utc::now),
        completed_at: get_time("completed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchain_models::LongFormRequest;

    fn sample_job() -> VideoJob {
        let req = LongFormRequest {
            job_id: "job-9".to_string(),
            owner_id: "owner".to_string(),
            prompts: vec!["one".to_string(), "two".to_string()],
            options: Some(GenerationOptions {
                aspect_ratio: AspectRatio::Portrait,
                generate_audio: Some(true),
                seed: Some(11),
                ..Default::default()
            }),
            ..Default::default()
        };
        VideoJob::queued(&req)
    }

    #[test]
    fn test_job_fields_decode_back() {
        let job = sample_job();
        let doc = Document::new(job_to_fields(&job));
        let decoded = document_to_job(&doc, &job.id).unwrap();

        assert_eq!(decoded.prompts, job.prompts);
        assert_eq!(decoded.options, job.options);
        assert_eq!(decoded.status, JobStatus::Queued);
        assert_eq!(decoded.total_segments, 2);
        assert_eq!(decoded.organization_id, "personal");
        assert!(decoded.output.is_none());
    }

    #[test]
    fn test_update_mask_covers_only_set_fields() {
        let update = JobUpdate::new()
            .status(JobStatus::Processing)
            .current_step("generating segment 1/2");
        let (fields, mask) = update_to_fields(&update, Utc::now());

        assert_eq!(mask, vec!["current_step", "status", "updated_at"]);
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_output_is_written_as_nested_map() {
        let update = JobUpdate::new().output(VideoOutput {
            url: "https://signed".to_string(),
            metadata: OutputMetadata {
                duration_seconds: 10.0,
                fps: 30,
                mime_type: "video/mp4".to_string(),
                resolution: "1280x720".to_string(),
            },
        });
        let (fields, _) = update_to_fields(&update, Utc::now());
        let decoded = value_to_output(fields.get("output")).unwrap();
        assert_eq!(decoded.metadata.fps, 30);
        assert_eq!(decoded.url, "https://signed");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut fields = job_to_fields(&sample_job());
        fields.insert("status".to_string(), "generating".to_firestore_value());
        let doc = Document::new(fields);
        assert!(document_to_job(&doc, &JobId::from("job-9")).is_err());
    }
}
