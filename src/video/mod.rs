//! Video data model
//!
//! Stream and pixel formats, samples going in, decoded frames coming out,
//! and the packaging step between engine images and caller images.

pub mod format;
pub mod frame;
pub mod package;

pub use format::{
    ColorDepth, ColorInfo, ColorPrimaries, ColorRange, PixelFormat, Resolution, StreamType,
    TransferFunction, YuvColorSpace,
};
pub use frame::{DecodedFrame, FrameDescriptor, ImagePlane, ImageStorage, Sample, VideoImage};
pub use package::{DefaultImagePackager, ImageMetadata, ImagePackager};
