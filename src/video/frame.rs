//! Sample and decoded frame data structures

use bytes::Bytes;
use std::fmt;

use super::format::{ColorInfo, PixelFormat, Resolution};

/// A compressed video sample as handed over by the demuxer
#[derive(Debug, Clone)]
pub struct Sample {
    /// Encoded payload (shared, never copied by the pipeline)
    pub data: Bytes,
    /// Byte offset of the sample in the source stream
    pub byte_offset: i64,
    /// Decode timestamp in microseconds
    pub decode_ts_us: i64,
    /// Composition (presentation) timestamp in microseconds
    pub composition_ts_us: i64,
    /// Duration in microseconds
    pub duration_us: i64,
    /// Whether this sample is a sync point
    pub keyframe: bool,
}

impl Sample {
    pub fn new(data: impl Into<Bytes>, decode_ts_us: i64, composition_ts_us: i64) -> Self {
        Self {
            data: data.into(),
            byte_offset: 0,
            decode_ts_us,
            composition_ts_us,
            duration_us: 0,
            keyframe: false,
        }
    }

    pub fn with_duration(mut self, duration_us: i64) -> Self {
        self.duration_us = duration_us;
        self
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    pub fn with_byte_offset(mut self, byte_offset: i64) -> Self {
        self.byte_offset = byte_offset;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Timing snapshot of a submitted sample.
///
/// Owns no payload so it can travel through the engine and come back on a
/// completion thread after the caller's sample is long gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub byte_offset: i64,
    pub decode_ts_us: i64,
    pub composition_ts_us: i64,
    pub duration_us: i64,
    pub is_sync_point: bool,
}

impl FrameDescriptor {
    /// Presentation end time
    pub fn end_ts_us(&self) -> i64 {
        self.composition_ts_us.saturating_add(self.duration_us)
    }
}

impl From<&Sample> for FrameDescriptor {
    fn from(sample: &Sample) -> Self {
        Self {
            byte_offset: sample.byte_offset,
            decode_ts_us: sample.decode_ts_us,
            composition_ts_us: sample.composition_ts_us,
            duration_us: sample.duration_us,
            is_sync_point: sample.keyframe,
        }
    }
}

/// One image plane
#[derive(Debug, Clone)]
pub struct ImagePlane {
    pub data: Bytes,
    /// Bytes per row
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

/// How a packaged image holds its pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStorage {
    /// Pixels were copied out of the engine buffer
    Copied,
    /// Pixels are shared with the engine surface
    Shared,
}

/// A caller-consumable decoded image
#[derive(Debug, Clone)]
pub struct VideoImage {
    /// Display size
    pub display: Resolution,
    /// Visible picture size
    pub picture: Resolution,
    pub format: PixelFormat,
    pub color: ColorInfo,
    pub planes: Vec<ImagePlane>,
    pub storage: ImageStorage,
}

/// Output of the pipeline, in order
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    /// A real decoded picture
    Video {
        image: VideoImage,
        descriptor: FrameDescriptor,
    },
    /// Timing-only stand-in for a frame before the seek target
    Placeholder { descriptor: FrameDescriptor },
}

impl DecodedFrame {
    pub fn descriptor(&self) -> &FrameDescriptor {
        match self {
            Self::Video { descriptor, .. } | Self::Placeholder { descriptor } => descriptor,
        }
    }

    pub fn decode_ts_us(&self) -> i64 {
        self.descriptor().decode_ts_us
    }

    pub fn composition_ts_us(&self) -> i64 {
        self.descriptor().composition_ts_us
    }

    pub fn end_ts_us(&self) -> i64 {
        self.descriptor().end_ts_us()
    }

    pub fn image(&self) -> Option<&VideoImage> {
        match self {
            Self::Video { image, .. } => Some(image),
            Self::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor();
        let kind = if self.is_placeholder() { "null" } else { "video" };
        write!(
            f,
            "{} dts={}us pts={}us dur={}us{}",
            kind,
            d.decode_ts_us,
            d.composition_ts_us,
            d.duration_us,
            if d.is_sync_point { " keyframe" } else { "" }
        )
    }
}
