//! Parameter types for image operations.
//!
//! These structs describe *what* to do to a slice, not *how*. The
//! [`operations`](super::operations) module turns them into backend calls;
//! the [`backend`](super::backend) does the pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality (1–100, default 90). Clamped on construction.
//! - [`ScaleBar`]: Scale-bar length in px plus where and how bright to draw it.
//! - [`Region`]: Axis-aligned pixel rectangle.
//! - [`SliceTransform`]: Everything applied to one slice between decode and encode.

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Scale bar drawn into the bottom-right corner of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleBar {
    /// Bar length in source pixels.
    pub length_px: u32,
    /// Distance from the right and bottom image edges.
    pub margin: u32,
    /// Gray value written into the bar.
    pub brightness: u8,
}

/// Pixel rectangle, `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Transform applied to every exported slice.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SliceTransform {
    pub scalebar: Option<ScaleBar>,
    /// Uniform scale factor for both axes, always `<= 1`.
    pub resize_fraction: Option<f64>,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn default_transform_is_identity() {
        let t = SliceTransform::default();
        assert_eq!(t.scalebar, None);
        assert_eq!(t.resize_fraction, None);
    }
}
