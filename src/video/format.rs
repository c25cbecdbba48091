//! Stream, pixel format and color metadata definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compressed stream types the pipeline can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    H264,
    Hevc,
    Vp9,
    Av1,
}

impl StreamType {
    /// Resolve a stream type from a MIME type (codec parameters are ignored)
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "video/avc" | "video/h264" => Some(Self::H264),
            "video/hevc" | "video/h265" => Some(Self::Hevc),
            "video/vp9" | "video/x-vnd.on2.vp9" => Some(Self::Vp9),
            "video/av1" => Some(Self::Av1),
            _ => None,
        }
    }

    /// Name of the codec configuration box carried as extradata
    pub fn config_box(&self) -> &'static str {
        match self {
            Self::H264 => "avcC",
            Self::Hevc => "hvcC",
            Self::Vp9 => "vpcC",
            Self::Av1 => "av1C",
        }
    }

    /// Whether streams of this type may reorder frames through reference pictures
    pub fn uses_reference_reordering(&self) -> bool {
        matches!(self, Self::H264 | Self::Hevc)
    }
}

impl Default for StreamType {
    fn default() -> Self {
        Self::H264
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H264 => "H264",
            Self::Hevc => "HEVC",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "hevc" | "h265" => Ok(Self::Hevc),
            "vp9" => Ok(Self::Vp9),
            "av1" => Ok(Self::Av1),
            _ => Self::from_mime_type(s).ok_or_else(|| format!("Unknown stream type: {}", s)),
        }
    }
}

/// Decoded image pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// 8-bit 4:2:0 three-plane (I420)
    Yuv420p,
    /// 8-bit 4:2:0 bi-planar, video range
    Nv12,
    /// 8-bit 4:2:0 bi-planar, full range
    Nv12Full,
    /// 10-bit 4:2:0 bi-planar, video range
    P010,
    /// 10-bit 4:2:0 bi-planar, full range
    P010Full,
    /// 8-bit 4:2:2 packed
    Yuv422,
    /// 32-bit BGRA
    Bgra32,
}

impl PixelFormat {
    /// Number of planes an image in this format carries
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Yuv420p => 3,
            Self::Nv12 | Self::Nv12Full | Self::P010 | Self::P010Full => 2,
            Self::Yuv422 | Self::Bgra32 => 1,
        }
    }

    /// Output format requested from the engine for hardware surfaces
    pub fn bi_planar(depth: ColorDepth, range: ColorRange) -> Self {
        match (depth.bits() == 10, range) {
            (true, ColorRange::Full) => Self::P010Full,
            (true, ColorRange::Limited) => Self::P010,
            (false, ColorRange::Full) => Self::Nv12Full,
            (false, ColorRange::Limited) => Self::Nv12,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Yuv420p => "YUV420P",
            Self::Nv12 => "NV12",
            Self::Nv12Full => "NV12F",
            Self::P010 => "P010",
            Self::P010Full => "P010F",
            Self::Yuv422 => "YUV422",
            Self::Bgra32 => "BGRA32",
        };
        write!(f, "{}", name)
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const HD1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// YCbCr matrix coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YuvColorSpace {
    Bt601,
    Bt709,
    Bt2020,
    Identity,
}

impl YuvColorSpace {
    /// SD content defaults to BT.601, everything else to BT.709
    pub fn default_for(picture: Resolution) -> Self {
        if picture.height < 720 {
            Self::Bt601
        } else {
            Self::Bt709
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPrimaries {
    #[default]
    Bt709,
    Bt2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferFunction {
    #[default]
    Bt709,
    Srgb,
    Pq,
    Hlg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    #[default]
    Limited,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorDepth {
    #[default]
    Eight,
    Ten,
    Twelve,
}

impl ColorDepth {
    pub fn bits(&self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Ten => 10,
            Self::Twelve => 12,
        }
    }
}

/// Resolved color metadata attached to every packaged image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorInfo {
    pub color_space: YuvColorSpace,
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
    pub range: ColorRange,
    pub depth: ColorDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_from_mime() {
        assert_eq!(StreamType::from_mime_type("video/avc"), Some(StreamType::H264));
        assert_eq!(
            StreamType::from_mime_type("video/hevc; codecs=\"hev1.1.6.L93.B0\""),
            Some(StreamType::Hevc)
        );
        assert_eq!(StreamType::from_mime_type("video/vp9"), Some(StreamType::Vp9));
        assert_eq!(StreamType::from_mime_type("VIDEO/AV1"), Some(StreamType::Av1));
        assert_eq!(StreamType::from_mime_type("audio/opus"), None);
        assert_eq!("h265".parse::<StreamType>(), Ok(StreamType::Hevc));
    }

    #[test]
    fn test_default_color_space() {
        assert_eq!(
            YuvColorSpace::default_for(Resolution::new(720, 576)),
            YuvColorSpace::Bt601
        );
        assert_eq!(
            YuvColorSpace::default_for(Resolution::HD720),
            YuvColorSpace::Bt709
        );
    }

    #[test]
    fn test_bi_planar_output_format() {
        assert_eq!(
            PixelFormat::bi_planar(ColorDepth::Ten, ColorRange::Full),
            PixelFormat::P010Full
        );
        assert_eq!(
            PixelFormat::bi_planar(ColorDepth::Eight, ColorRange::Limited),
            PixelFormat::Nv12
        );
        assert_eq!(PixelFormat::Yuv420p.plane_count(), 3);
    }
}
