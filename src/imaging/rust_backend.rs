//! Pure Rust image backend on top of the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (PNG, TIFF, JPEG) | `image::ImageReader` → `to_luma8` |
//! | Resize | `image::imageops::resize` with `Triangle` (bilinear) filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GrayImage, ImageReader};
use std::path::Path;

/// Bilinear resampling.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read dimensions of {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, path: &Path) -> Result<GrayImage, BackendError> {
        let img = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to decode {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(img.into_luma8())
    }

    fn resize(&self, image: &GrayImage, target: Dimensions) -> GrayImage {
        image::imageops::resize(image, target.width, target.height, RESIZE_FILTER)
    }

    fn encode(&self, image: &GrayImage, path: &Path, quality: Quality) -> Result<(), BackendError> {
        let file = std::fs::File::create(path).map_err(BackendError::Io)?;
        let writer = std::io::BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(writer, quality.value());
        image.write_with_encoder(encoder).map_err(|e| {
            BackendError::ProcessingFailed(format!("JPEG encode failed for {}: {}", path.display(), e))
        })
    }
}
