//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the only seam between the export logic and
//! an image library. Slices travel between its operations as in-memory 8-bit
//! grayscale buffers ([`GrayImage`]), so tests can substitute a backend that
//! never touches a real file.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image` crate.

use super::params::{Quality, Region};
use image::{GrayImage, Luma};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image backends.
///
/// `Sync` so one backend can serve a parallel export.
pub trait ImageBackend: Sync {
    /// Get image dimensions without decoding pixel data.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode a slice to 8-bit grayscale.
    fn decode(&self, path: &Path) -> Result<GrayImage, BackendError>;

    /// Fill `region` with `value`. The region is clipped to the image.
    fn stamp_rectangle(&self, image: &mut GrayImage, region: Region, value: u8) {
        let x_end = (region.x + region.width).min(image.width());
        let y_end = (region.y + region.height).min(image.height());
        for y in region.y..y_end {
            for x in region.x..x_end {
                image.put_pixel(x, y, Luma([value]));
            }
        }
    }

    /// Resample to exactly `target` dimensions.
    fn resize(&self, image: &GrayImage, target: Dimensions) -> GrayImage;

    /// Encode as JPEG at `path`.
    fn encode(&self, image: &GrayImage, path: &Path, quality: Quality) -> Result<(), BackendError>;
}
