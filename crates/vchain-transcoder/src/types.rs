//! Transcoder job types and wire format.

use serde::{Deserialize, Serialize};
use std::fmt;

use vchain_models::Resolution;

/// Bitrate of the stitched video stream.
pub const VIDEO_BITRATE_BPS: u32 = 5_000_000;

/// Frame rate of the stitched video stream.
pub const VIDEO_FRAME_RATE: u32 = 30;

/// Bitrate of the throwaway stream produced alongside an extracted frame.
const PREVIEW_BITRATE_BPS: u32 = 550_000;

const AUDIO_BITRATE_BPS: u32 = 128_000;
const AUDIO_CHANNELS: u32 = 2;
const AUDIO_SAMPLE_RATE_HZ: u32 = 48_000;

/// File prefix of sprite-sheet images.
pub const SPRITE_FILE_PREFIX: &str = "frame_";

/// Mux stream key of the stitched video, which is also its file name.
pub const CONCAT_OUTPUT_KEY: &str = "final_output";

/// Reference to a submitted Transcoder job (`projects/../jobs/..`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscoderJobHandle(pub String);

impl TranscoderJobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TranscoderJobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of a Transcoder job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    ProcessingStateUnspecified,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobPoll {
    pub state: JobState,
    /// Provider error detail, set when the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Grab one frame of `source_uri` at `offset_secs` into `output_uri`.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source_uri: String,
    pub offset_secs: f64,
    /// Directory URI ending in `/`
    pub output_uri: String,
    pub resolution: Resolution,
}

/// Concatenate `input_uris` in order into `output_uri`.
#[derive(Debug, Clone)]
pub struct ConcatenationRequest {
    pub input_uris: Vec<String>,
    /// Directory URI ending in `/`
    pub output_uri: String,
    pub resolution: Resolution,
    pub include_audio: bool,
}

/// Transcoder duration literal (`4.5s`).
pub(crate) fn duration_literal(secs: f64) -> String {
    format!("{}s", secs.max(0.0))
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CreateJobRequest {
    pub config: JobConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobConfig {
    pub inputs: Vec<Input>,
    pub edit_list: Vec<EditAtom>,
    pub elementary_streams: Vec<ElementaryStream>,
    pub mux_streams: Vec<MuxStream>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sprite_sheets: Vec<SpriteSheet>,
    pub output: Output,
}

#[derive(Debug, Serialize)]
pub(crate) struct Input {
    pub key: String,
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditAtom {
    pub key: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ElementaryStream {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_stream: Option<VideoStream>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream: Option<AudioStream>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VideoStream {
    pub h264: H264Settings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct H264Settings {
    pub width_pixels: u32,
    pub height_pixels: u32,
    pub bitrate_bps: u32,
    pub frame_rate: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AudioStream {
    pub codec: String,
    pub bitrate_bps: u32,
    pub channel_count: u32,
    pub sample_rate_hertz: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MuxStream {
    pub key: String,
    pub container: String,
    pub elementary_streams: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpriteSheet {
    pub file_prefix: String,
    pub sprite_width_pixels: u32,
    pub sprite_height_pixels: u32,
    pub column_count: u32,
    pub row_count: u32,
    pub total_count: u32,
    pub start_time_offset: String,
    pub quality: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct Output {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub error: Option<JobErrorStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobErrorStatus {
    #[serde(default)]
    pub message: String,
}

fn h264_stream(key: &str, resolution: Resolution, bitrate_bps: u32) -> ElementaryStream {
    ElementaryStream {
        key: key.to_string(),
        video_stream: Some(VideoStream {
            h264: H264Settings {
                width_pixels: resolution.width,
                height_pixels: resolution.height,
                bitrate_bps,
                frame_rate: VIDEO_FRAME_RATE,
            },
        }),
        audio_stream: None,
    }
}

impl From<&ExtractionRequest> for JobConfig {
    fn from(req: &ExtractionRequest) -> Self {
        Self {
            inputs: vec![Input {
                key: "input0".into(),
                uri: req.source_uri.clone(),
            }],
            edit_list: vec![EditAtom {
                key: "atom0".into(),
                inputs: vec!["input0".into()],
            }],
            // The API rejects configs without a mux stream.
            elementary_streams: vec![h264_stream("video_stream0", req.resolution, PREVIEW_BITRATE_BPS)],
            mux_streams: vec![MuxStream {
                key: "preview".into(),
                container: "mp4".into(),
                elementary_streams: vec!["video_stream0".into()],
            }],
            sprite_sheets: vec![SpriteSheet {
                file_prefix: SPRITE_FILE_PREFIX.into(),
                sprite_width_pixels: req.resolution.width,
                sprite_height_pixels: req.resolution.height,
                column_count: 1,
                row_count: 1,
                total_count: 1,
                start_time_offset: duration_literal(req.offset_secs),
                quality: 100,
            }],
            output: Output {
                uri: req.output_uri.clone(),
            },
        }
    }
}

impl From<&ConcatenationRequest> for JobConfig {
    fn from(req: &ConcatenationRequest) -> Self {
        let inputs: Vec<Input> = req
            .input_uris
            .iter()
            .enumerate()
            .map(|(i, uri)| Input {
                key: format!("input{}", i),
                uri: uri.clone(),
            })
            .collect();

        // One atom per input plays the inputs back to back.
        let edit_list = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| EditAtom {
                key: format!("atom{}", i),
                inputs: vec![input.key.clone()],
            })
            .collect();

        let mut elementary_streams = vec![h264_stream("video_stream0", req.resolution, VIDEO_BITRATE_BPS)];
        let mut muxed = vec!["video_stream0".to_string()];
        if req.include_audio {
            elementary_streams.push(ElementaryStream {
                key: "audio_stream0".into(),
                video_stream: None,
                audio_stream: Some(AudioStream {
                    codec: "aac".into(),
                    bitrate_bps: AUDIO_BITRATE_BPS,
                    channel_count: AUDIO_CHANNELS,
                    sample_rate_hertz: AUDIO_SAMPLE_RATE_HZ,
                }),
            });
            muxed.push("audio_stream0".into());
        }

        Self {
            inputs,
            edit_list,
            elementary_streams,
            mux_streams: vec![MuxStream {
                key: CONCAT_OUTPUT_KEY.into(),
                container: "mp4".into(),
                elementary_streams: muxed,
            }],
            sprite_sheets: Vec::new(),
            output: Output {
                uri: req.output_uri.clone(),
            },
        }
    }
}
