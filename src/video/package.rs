//! Conversion of engine images into caller images

use bytes::BytesMut;

use super::format::{ColorInfo, PixelFormat, Resolution};
use super::frame::{FrameDescriptor, ImagePlane, ImageStorage, VideoImage};
use crate::engine::EngineImage;
use crate::error::{DecodeError, Result};

/// Geometry and color metadata applied to every packaged image
#[derive(Debug, Clone, Copy)]
pub struct ImageMetadata {
    pub display: Resolution,
    pub picture: Resolution,
    pub color: ColorInfo,
}

/// Turns an engine image into a caller-consumable image
pub trait ImagePackager: Send + Sync {
    fn package(
        &self,
        image: EngineImage,
        descriptor: &FrameDescriptor,
        metadata: &ImageMetadata,
    ) -> Result<VideoImage>;
}

/// Packager with two modes: copied software planes or shared surfaces
pub struct DefaultImagePackager {
    software_images: bool,
}

impl DefaultImagePackager {
    pub fn new(software_images: bool) -> Self {
        Self { software_images }
    }

    /// Copy a three-plane 4:2:0 image into tightly packed planes cropped
    /// to the picture size
    fn copy_planar(&self, image: &EngineImage, metadata: &ImageMetadata) -> Result<Vec<ImagePlane>> {
        if image.format != PixelFormat::Yuv420p || image.planes.len() != 3 {
            return Err(DecodeError::ImagePackaging(format!(
                "software images need 3-plane YUV420P, engine produced {} with {} planes",
                image.format,
                image.planes.len()
            )));
        }

        let width = metadata.picture.width.min(image.size.width);
        let height = metadata.picture.height.min(image.size.height);
        let chroma = ((width + 1) / 2, (height + 1) / 2);

        image
            .planes
            .iter()
            .enumerate()
            .map(|(i, src)| {
                let (w, h) = if i == 0 { (width, height) } else { chroma };
                crop_plane(src, w as usize, h as usize)
            })
            .collect()
    }

    fn share_surface(&self, image: EngineImage) -> Result<Vec<ImagePlane>> {
        if image.planes.len() != image.format.plane_count() {
            return Err(DecodeError::ImagePackaging(format!(
                "{} surface has {} planes, expected {}",
                image.format,
                image.planes.len(),
                image.format.plane_count()
            )));
        }
        Ok(image.planes)
    }
}

fn crop_plane(src: &ImagePlane, width: usize, height: usize) -> Result<ImagePlane> {
    if height == 0 || width == 0 {
        return Err(DecodeError::ImagePackaging("empty plane".to_string()));
    }
    let needed = src.stride * (height - 1) + width;
    if src.stride < width || src.data.len() < needed {
        return Err(DecodeError::ImagePackaging(format!(
            "plane too small: {} bytes with stride {} for {}x{}",
            src.data.len(),
            src.stride,
            width,
            height
        )));
    }

    let mut dst = BytesMut::with_capacity(width * height);
    for row in src.data.chunks(src.stride).take(height) {
        dst.extend_from_slice(&row[..width]);
    }

    Ok(ImagePlane {
        data: dst.freeze(),
        stride: width,
        width: width as u32,
        height: height as u32,
    })
}

impl ImagePackager for DefaultImagePackager {
    fn package(
        &self,
        image: EngineImage,
        _descriptor: &FrameDescriptor,
        metadata: &ImageMetadata,
    ) -> Result<VideoImage> {
        let format = image.format;
        let (planes, storage) = if self.software_images {
            (self.copy_planar(&image, metadata)?, ImageStorage::Copied)
        } else {
            (self.share_surface(image)?, ImageStorage::Shared)
        };

        Ok(VideoImage {
            display: metadata.display,
            picture: metadata.picture,
            format,
            color: metadata.color,
            planes,
            storage,
        })
    }
}
