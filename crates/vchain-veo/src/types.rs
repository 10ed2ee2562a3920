//! Veo request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use vchain_models::GenerationOptions;

use crate::error::{VeoError, VeoResult};

/// One segment generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Raw base64 of the start image, already validated
    pub image_base64: Option<String>,
    pub options: GenerationOptions,
    /// Requested clip length in seconds
    pub duration_secs: u32,
}

/// Opaque provider reference to a running operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error reported inside a finished operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// Snapshot of a long-running operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OperationStatus {
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl OperationStatus {
    /// Status used when the provider could not be reached or answered with
    /// a non-success code.
    pub fn pending() -> Self {
        Self::default()
    }
}

/// Playable reference extracted from a finished operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GeneratedVideo {
    /// Base64 video bytes returned inline
    Inline(String),
    /// Provider-hosted or bucket URI
    Uri(String),
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest {
    pub instances: Vec<Instance>,
    pub parameters: Parameters,
}

#[derive(Debug, Serialize)]
pub(crate) struct Instance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineImage {
    pub bytes_base64_encoded: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Parameters {
    pub sample_count: u32,
    pub video_length: String,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_audio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl From<&GenerationRequest> for PredictRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            instances: vec![Instance {
                prompt: req.prompt.clone(),
                image: req.image_base64.clone().map(|b| InlineImage {
                    bytes_base64_encoded: b,
                }),
            }],
            parameters: Parameters {
                sample_count: 1,
                video_length: format!("{}s", req.duration_secs),
                aspect_ratio: req.options.aspect_ratio.as_str().to_string(),
                generate_audio: req.options.generate_audio.filter(|a| *a),
                negative_prompt: req.options.negative_prompt.clone(),
                seed: req.options.seed,
                resolution: req.options.resolution.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationName {
    pub name: Option<String>,
}

// =============================================================================
// Response parsing
// =============================================================================

/// Where the provider has been observed to put the generated sample.
const SAMPLE_POINTERS: &[&str] = &[
    "/outputs/0",
    "/generateVideoResponse/generatedSamples/0",
    "/generatedSamples/0",
    "/videos/0",
    "/predictions/0",
];

/// Extract a playable reference from a finished operation's `response`.
///
/// Inline bytes take priority over a video URI, which takes priority over a
/// bucket URI.
pub fn parse_generated_video(response: &JsonValue) -> VeoResult<GeneratedVideo> {
    let sample = SAMPLE_POINTERS
        .iter()
        .find_map(|p| response.pointer(p))
        .unwrap_or(response);

    let text_at = |pointer: &str| {
        sample
            .pointer(pointer)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(bytes) = text_at("/video/bytesBase64Encoded").or_else(|| text_at("/bytesBase64Encoded")) {
        return Ok(GeneratedVideo::Inline(bytes));
    }
    if let Some(uri) = text_at("/video/uri").or_else(|| text_at("/videoUri")) {
        return Ok(GeneratedVideo::Uri(uri));
    }
    if let Some(uri) = text_at("/video/gcsUri").or_else(|| text_at("/gcsUri")) {
        return Ok(GeneratedVideo::Uri(uri));
    }

    let filtered = response
        .pointer("/generateVideoResponse/raiMediaFilteredReasons")
        .map(|r| format!(" (filtered: {})", r))
        .unwrap_or_default();

    let shape: String = response.to_string().chars().take(300).collect();
    Err(VeoError::UnrecognizedResponse(format!("{}{}", shape, filtered)))
}
