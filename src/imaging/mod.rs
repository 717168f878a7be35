//! Slice image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Decode** | `image::ImageReader` → 8-bit grayscale |
//! | **Scale bar** | rectangle fill on the grayscale buffer |
//! | **Resize** | `imageops::resize` with a bilinear filter |
//! | **Encode** | `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for slice geometry (unit testable)
//! - **Parameters**: Data structures describing what happens to a slice
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::scalebar_height;
pub use operations::{
    OperationError, SlicePlan, export_slice, get_longest_side, plan_from_header, plan_slice,
};
pub use params::{Quality, Region, ScaleBar, SliceTransform};
pub use rust_backend::RustBackend;
