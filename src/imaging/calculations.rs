//! Pure calculation functions for slice geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;
use super::params::{Region, ScaleBar};

/// The longer of the two image sides.
pub fn longest_side(dims: Dimensions) -> u32 {
    dims.width.max(dims.height)
}

/// Scale-bar thickness: a tenth of its length, rounded, at least one pixel.
pub fn scalebar_height(length_px: u32) -> u32 {
    ((length_px as f64 / 10.0).round() as u32).max(1)
}

/// Locate the scale bar in an image of the given size.
///
/// The bar's bottom-right corner sits `margin` pixels in from the right and
/// bottom edges:
///
/// ```text
/// +----------------------------+
/// |                            |
/// |                            |
/// |             ██████████     |  height = round(length / 10)
/// |                       ↕ margin
/// +----------------------------+
///                          ↔ margin
/// ```
///
/// Returns `None` when the bar plus margin does not fit.
pub fn scalebar_region(dims: Dimensions, bar: &ScaleBar) -> Option<Region> {
    let height = scalebar_height(bar.length_px);
    let x = dims.width.checked_sub(bar.margin)?.checked_sub(bar.length_px)?;
    let y = dims.height.checked_sub(bar.margin)?.checked_sub(height)?;
    Some(Region {
        x,
        y,
        width: bar.length_px,
        height,
    })
}

/// Output dimensions after scaling both axes by `fraction`.
///
/// Rounded to the nearest pixel, never below one pixel.
pub fn scaled_dimensions(dims: Dimensions, fraction: f64) -> Dimensions {
    let scale = |side: u32| ((side as f64 * fraction).round() as u32).max(1);
    Dimensions {
        width: scale(dims.width),
        height: scale(dims.height),
    }
}
