//! Generation options and output geometry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Target aspect ratio for generated segments and the stitched output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    /// Landscape 16:9
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// Portrait 9:16
    #[serde(rename = "9:16")]
    Portrait,
    /// Square 1:1
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }

    /// Output resolution used when stitching segments of this aspect ratio.
    pub fn resolution(&self) -> Resolution {
        match self {
            AspectRatio::Landscape => Resolution::new(1280, 720),
            AspectRatio::Portrait => Resolution::new(720, 1280),
            AspectRatio::Square => Resolution::new(720, 720),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing an aspect ratio string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported aspect ratio '{0}', expected one of 16:9, 9:16, 1:1")]
pub struct AspectRatioParseError(pub String);

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            "1:1" => Ok(AspectRatio::Square),
            other => Err(AspectRatioParseError(other.to_string())),
        }
    }
}

/// Pixel dimensions of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Options forwarded to the generation provider for every segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Target aspect ratio
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Provider resolution hint (e.g. "720p")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Deterministic seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Content to steer away from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Ask the provider for an audio track and keep it when stitching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_audio: Option<bool>,
}

impl GenerationOptions {
    /// Whether the stitched output should carry an audio stream.
    pub fn include_audio(&self) -> bool {
        self.generate_audio.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_mapping() {
        let cases = [
            (AspectRatio::Portrait, "720x1280"),
            (AspectRatio::Landscape, "1280x720"),
            (AspectRatio::Square, "720x720"),
        ];
        for (aspect, expected) in cases {
            assert_eq!(aspect.resolution().to_string(), expected, "{}", aspect);
        }
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!(" 1:1 ".parse::<AspectRatio>().unwrap(), AspectRatio::Square);
        assert!("4:3".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_options_default_to_landscape() {
        let opts: GenerationOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.aspect_ratio, AspectRatio::Landscape);
        assert!(!opts.include_audio());
    }

    #[test]
    fn test_options_camel_case_wire_format() {
        let opts: GenerationOptions = serde_json::from_str(
            r#"{"aspectRatio":"9:16","negativePrompt":"blur","generateAudio":true,"seed":7}"#,
        )
        .unwrap();
        assert_eq!(opts.aspect_ratio, AspectRatio::Portrait);
        assert_eq!(opts.negative_prompt.as_deref(), Some("blur"));
        assert_eq!(opts.seed, Some(7));
        assert!(opts.include_audio());
    }
}
