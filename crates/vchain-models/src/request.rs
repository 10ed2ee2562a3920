//! Inbound long-form request and its validation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::GenerationOptions;

/// Maximum accepted job ID length (Firestore document IDs allow 1500 bytes).
pub const MAX_JOB_ID_LEN: usize = 128;

/// Request to start a long-form generation job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LongFormRequest {
    #[serde(default)]
    pub job_id: String,

    #[serde(default)]
    pub owner_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// One prompt per segment
    #[serde(default)]
    pub prompts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,

    /// Raw base64 or `data:` URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

/// Request validation failure. Nothing is persisted when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("jobId is required")]
    MissingJobId,

    #[error("invalid jobId: {0}")]
    InvalidJobId(String),

    #[error("ownerId is required")]
    MissingOwner,

    #[error("prompts must contain at least one prompt")]
    EmptyPrompts,

    #[error("invalid start image: {0}")]
    InvalidStartImage(String),
}

impl ValidationError {
    /// Stable error code reported to callers.
    pub fn code(&self) -> &'static str {
        "invalid-argument"
    }
}

impl LongFormRequest {
    /// Validate the request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let job_id = self.job_id.trim();
        if job_id.is_empty() {
            return Err(ValidationError::MissingJobId);
        }
        if !is_valid_job_id(job_id) {
            return Err(ValidationError::InvalidJobId(job_id.to_string()));
        }

        if self.owner_id.trim().is_empty() {
            return Err(ValidationError::MissingOwner);
        }

        if self.prompts.is_empty() {
            return Err(ValidationError::EmptyPrompts);
        }

        if let Some(image) = &self.start_image {
            validate_start_image(image)?;
        }

        Ok(())
    }
}

/// Document IDs must not contain path separators or be dot segments.
fn is_valid_job_id(id: &str) -> bool {
    id.len() <= MAX_JOB_ID_LEN && !id.contains('/') && id != "." && id != ".."
}

/// Validate an inline start image and return its raw base64 payload.
///
/// Accepts raw base64 or a `data:<mime>;base64,<payload>` URL. Remote
/// URLs are rejected; the image must be sent inline.
pub fn validate_start_image(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Err(ValidationError::InvalidStartImage(
            "remote URLs are not supported, send the image as base64".to_string(),
        ));
    }

    let payload = if trimmed.starts_with("data:") {
        match trimmed.split_once(',') {
            Some((_, data)) => data,
            None => {
                return Err(ValidationError::InvalidStartImage(
                    "malformed data URL".to_string(),
                ))
            }
        }
    } else {
        if trimmed.contains(',') {
            return Err(ValidationError::InvalidStartImage(
                "raw base64 must not contain commas".to_string(),
            ));
        }
        trimmed
    };

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(ValidationError::InvalidStartImage("image data is empty".to_string()));
    }

    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| ValidationError::InvalidStartImage(format!("invalid base64: {}", e)))?;

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LongFormRequest {
        LongFormRequest {
            job_id: "job-123".to_string(),
            owner_id: "user-1".to_string(),
            prompts: vec!["a cat on a skateboard".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_missing_job_id() {
        let req = LongFormRequest {
            job_id: "  ".to_string(),
            ..valid()
        };
        assert_eq!(req.validate(), Err(ValidationError::MissingJobId));
    }

    #[test]
    fn test_empty_prompts() {
        let req = LongFormRequest {
            prompts: vec![],
            ..valid()
        };
        assert_eq!(req.validate(), Err(ValidationError::EmptyPrompts));
        assert_eq!(ValidationError::EmptyPrompts.code(), "invalid-argument");
    }

    #[test]
    fn test_job_id_with_slash_rejected() {
        let req = LongFormRequest {
            job_id: "a/b".to_string(),
            ..valid()
        };
        assert!(matches!(req.validate(), Err(ValidationError::InvalidJobId(_))));
    }

    #[test]
    fn test_missing_fields_deserialize_to_validation_errors() {
        let req: LongFormRequest = serde_json::from_str(r#"{"prompts":["x"],"ownerId":"u"}"#).unwrap();
        assert_eq!(req.validate(), Err(ValidationError::MissingJobId));
    }

    #[test]
    fn test_start_image_data_url() {
        let raw = validate_start_image("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(raw, "aGVsbG8=");
    }

    #[test]
    fn test_start_image_strips_whitespace() {
        assert_eq!(validate_start_image(" aGVs\nbG8= ").unwrap(), "aGVsbG8=");
    }

    #[test]
    fn test_start_image_rejections() {
        assert!(validate_start_image("https://example.com/a.png").is_err());
        assert!(validate_start_image("data:image/png;base64").is_err());
        assert!(validate_start_image("abc,def").is_err());
        assert!(validate_start_image("data:image/png;base64,").is_err());
        assert!(validate_start_image("not*base64").is_err());
    }
}
