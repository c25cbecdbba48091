use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};
use crate::video::{
    ColorDepth, ColorInfo, ColorPrimaries, ColorRange, PixelFormat, Resolution, StreamType,
    TransferFunction, YuvColorSpace,
};

/// Largest reorder window any H.264/HEVC stream can require (DPB size)
pub const MAX_REORDER_WINDOW: usize = 16;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stream description
    pub stream: StreamConfig,
    /// Decoded image output settings
    pub output: OutputConfig,
    /// Reorder buffer settings
    pub reorder: ReorderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            output: OutputConfig::default(),
            reorder: ReorderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Number of frames held back before the oldest one may be released
    pub fn reorder_window(&self) -> usize {
        if self.stream.stream_type.uses_reference_reordering() && !self.reorder.low_latency {
            (self.stream.max_ref_frames as usize).min(MAX_REORDER_WINDOW)
        } else {
            0
        }
    }

    /// Pixel format requested from the engine
    pub fn output_format(&self) -> PixelFormat {
        if self.output.software_images {
            PixelFormat::Yuv420p
        } else {
            PixelFormat::bi_planar(self.stream.color.depth, self.stream.color.range)
        }
    }

    /// Display size, falling back to the picture size
    pub fn display(&self) -> Resolution {
        self.stream.display.unwrap_or(self.stream.picture)
    }

    /// Color metadata with unset fields resolved to their defaults
    pub fn color_info(&self) -> ColorInfo {
        let color = &self.stream.color;
        ColorInfo {
            color_space: color
                .color_space
                .unwrap_or_else(|| YuvColorSpace::default_for(self.stream.picture)),
            primaries: color.primaries,
            transfer: color.transfer,
            range: color.range,
            depth: color.depth,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.picture.is_empty() {
            return Err(DecodeError::Config(format!(
                "picture size must be non-zero, got {}",
                self.stream.picture
            )));
        }
        if let Some(display) = self.stream.display {
            if display.is_empty() {
                return Err(DecodeError::Config(format!(
                    "display size must be non-zero, got {}",
                    display
                )));
            }
        }
        if let Some(mime) = &self.stream.mime_type {
            match StreamType::from_mime_type(mime) {
                Some(t) if t == self.stream.stream_type => {}
                Some(t) => {
                    return Err(DecodeError::Config(format!(
                        "mime type {} describes {}, but stream type is {}",
                        mime, t, self.stream.stream_type
                    )))
                }
                None => {
                    return Err(DecodeError::Config(format!(
                        "unsupported mime type: {}",
                        mime
                    )))
                }
            }
        }
        if self.output.software_images && self.stream.color.depth != ColorDepth::Eight {
            return Err(DecodeError::Config(
                "software images require 8-bit content".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stream description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub stream_type: StreamType,
    /// Source MIME type, checked against `stream_type` when set
    pub mime_type: Option<String>,
    /// Coded picture size
    pub picture: Resolution,
    /// Display size (defaults to picture size)
    pub display: Option<Resolution>,
    /// Codec configuration record (avcC/hvcC/...)
    pub extradata: Vec<u8>,
    /// Reference frames the stream may hold (from the codec configuration)
    pub max_ref_frames: u32,
    pub color: ColorConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_type: StreamType::H264,
            mime_type: None,
            picture: Resolution::HD1080,
            display: None,
            extradata: Vec::new(),
            max_ref_frames: 4,
            color: ColorConfig::default(),
        }
    }
}

/// Color metadata of the stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ColorConfig {
    /// Matrix coefficients (derived from picture height when unset)
    pub color_space: Option<YuvColorSpace>,
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
    pub range: ColorRange,
    pub depth: ColorDepth,
}

/// Output image settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Copy planes out of engine buffers instead of sharing surfaces
    pub software_images: bool,
    /// Ask the engine for a hardware session
    pub prefer_hardware: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            software_images: false,
            prefer_hardware: true,
        }
    }
}

/// Ordering key of the reorder buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderKey {
    /// Decode timestamp
    #[default]
    Decode,
    /// Composition (presentation) timestamp
    Composition,
}

impl std::str::FromStr for ReorderKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decode" | "dts" => Ok(Self::Decode),
            "composition" | "presentation" | "pts" => Ok(Self::Composition),
            _ => Err(format!("Unknown reorder key: {}", s)),
        }
    }
}

/// Reorder buffer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ReorderConfig {
    /// Release frames as soon as they complete
    pub low_latency: bool,
    pub key: ReorderKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_window() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.reorder_window(), 4);

        config.stream.max_ref_frames = 32;
        assert_eq!(config.reorder_window(), MAX_REORDER_WINDOW);

        config.reorder.low_latency = true;
        assert_eq!(config.reorder_window(), 0);

        config.reorder.low_latency = false;
        config.stream.stream_type = StreamType::Vp9;
        assert_eq!(config.reorder_window(), 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"stream": {"stream_type": "hevc", "picture": {"width": 720, "height": 480}}}"#,
        )
        .unwrap();
        assert_eq!(config.stream.stream_type, StreamType::Hevc);
        assert_eq!(config.stream.max_ref_frames, 4);
        assert!(config.output.prefer_hardware);
        assert_eq!(config.reorder.key, ReorderKey::Decode);
        assert_eq!(config.color_info().color_space, YuvColorSpace::Bt601);
        assert_eq!(config.display(), Resolution::new(720, 480));
    }

    #[test]
    fn test_output_format() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.output_format(), PixelFormat::Nv12);

        config.stream.color.depth = ColorDepth::Ten;
        config.stream.color.range = ColorRange::Full;
        assert_eq!(config.output_format(), PixelFormat::P010Full);

        config.output.software_images = true;
        assert_eq!(config.output_format(), PixelFormat::Yuv420p);
    }

    #[test]
    fn test_validate() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.stream.mime_type = Some("video/hevc".to_string());
        assert!(matches!(config.validate(), Err(DecodeError::Config(_))));

        config.stream.mime_type = Some("video/avc".to_string());
        assert!(config.validate().is_ok());

        config.stream.picture = Resolution::new(0, 0);
        assert!(config.validate().is_err());
    }
}
