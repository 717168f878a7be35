//! High-level slice operations.
//!
//! These functions combine calculations with backend execution: decode,
//! stamp the scale bar, resize, encode.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{longest_side, scaled_dimensions, scalebar_region};
use super::params::{Region, ScaleBar, SliceTransform};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(
        "A {length_px} px scale bar at {margin} px from the border does not fit into a {width}x{height} px slice"
    )]
    StampOutOfBounds {
        length_px: u32,
        margin: u32,
        width: u32,
        height: u32,
    },
}

/// Result type for slice operations.
pub type Result<T> = std::result::Result<T, OperationError>;

/// Longest side of an image on disk, read from its header.
pub fn get_longest_side(backend: &impl ImageBackend, path: &Path) -> Result<u32> {
    Ok(longest_side(backend.identify(path)?))
}

/// What [`export_slice`] did to one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePlan {
    pub source: Dimensions,
    pub stamp: Option<Region>,
    pub output: Dimensions,
}

/// Plan a slice from its header alone, without decoding pixels.
///
/// Lets a run reject a transform that cannot be applied before writing
/// anything.
pub fn plan_from_header(
    backend: &impl ImageBackend,
    path: &Path,
    transform: &SliceTransform,
) -> Result<SlicePlan> {
    plan_slice(backend.identify(path)?, transform)
}

/// Plan the pixel work for a slice of the given size without executing it.
pub fn plan_slice(source: Dimensions, transform: &SliceTransform) -> Result<SlicePlan> {
    let stamp = transform
        .scalebar
        .map(|bar| stamp_region(source, &bar))
        .transpose()?;
    let output = match transform.resize_fraction {
        Some(fraction) => scaled_dimensions(source, fraction),
        None => source,
    };
    Ok(SlicePlan {
        source,
        stamp,
        output,
    })
}

fn stamp_region(dims: Dimensions, bar: &ScaleBar) -> Result<Region> {
    scalebar_region(dims, bar).ok_or(OperationError::StampOutOfBounds {
        length_px: bar.length_px,
        margin: bar.margin,
        width: dims.width,
        height: dims.height,
    })
}

/// Decode `source`, apply `transform` and encode the result to `output`.
///
/// The scale bar is stamped at full resolution, before resizing, so its
/// length stays calibrated against the source pixel size.
pub fn export_slice(
    backend: &impl ImageBackend,
    source: &Path,
    output: &Path,
    transform: &SliceTransform,
) -> Result<SlicePlan> {
    let mut image = backend.decode(source)?;
    let (width, height) = image.dimensions();
    let plan = plan_slice(Dimensions { width, height }, transform)?;

    if let (Some(region), Some(bar)) = (plan.stamp, transform.scalebar) {
        backend.stamp_rectangle(&mut image, region, bar.brightness);
    }
    if plan.output != plan.source {
        image = backend.resize(&image, plan.output);
    }
    backend.encode(&image, output, transform.quality)?;
    Ok(plan)
}
