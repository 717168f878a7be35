//! Systematic uniform random sampling through the reconstruction stack.
//!
//! Stereology needs slices that are evenly spaced *and* unbiased. Both come
//! from a fixed stride with a single random start:
//!
//! ```text
//! stack:    0 1 2 3 4 5 6 7 8 9 10 11 12 ...
//! step 4, offset 2:
//! selected:     2       6       10          ...
//! ```
//!
//! The stride is derived either from a requested number of slices or from a
//! requested physical slice distance. Both use `floor`, so a count request
//! never yields fewer slices than asked for. The offset is drawn once per
//! plan from `[0, step_width)`; each run legitimately samples a different set
//! of slices.

use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SamplingError {
    #[error(
        "The options \"number of files\" (-n) and \"slice distance\" (-s) are mutually exclusive, choose one"
    )]
    ModeConflict,
    #[error("Give either a number of files (-n) or a slice distance (-s)")]
    ModeMissing,
    #[error("{0} must be a positive number")]
    NonPositiveValue(&'static str),
    #[error("The reconstruction stack is empty")]
    EmptyStack,
    #[error("Cannot select {requested} from only {total} slices")]
    TooFewSlices { requested: String, total: usize },
    #[error(
        "A slice distance of {distance_um} um is a step of {step_width} slices, longer than the whole stack of {total} slices"
    )]
    StepExceedsStack {
        distance_um: f64,
        step_width: usize,
        total: usize,
    },
}

/// How the stride through the stack is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Select (at least) this many slices.
    ByCount(u32),
    /// Select slices this many µm apart.
    ByDistance(f64),
}

impl SamplingMode {
    /// Build the mode from the two mutually exclusive flags.
    pub fn from_flags(
        file_count: Option<u32>,
        slice_distance_um: Option<f64>,
    ) -> Result<Self, SamplingError> {
        let mode = match (file_count, slice_distance_um) {
            (Some(_), Some(_)) => return Err(SamplingError::ModeConflict),
            (None, None) => return Err(SamplingError::ModeMissing),
            (Some(n), None) => SamplingMode::ByCount(n),
            (None, Some(d)) => SamplingMode::ByDistance(d),
        };
        mode.validate()?;
        Ok(mode)
    }

    fn validate(&self) -> Result<(), SamplingError> {
        match *self {
            SamplingMode::ByCount(0) => Err(SamplingError::NonPositiveValue("Number of files")),
            SamplingMode::ByDistance(d) if !(d.is_finite() && d > 0.0) => {
                Err(SamplingError::NonPositiveValue("Slice distance"))
            }
            _ => Ok(()),
        }
    }

    /// Short tag used in the output folder name (`n15`, `sd50um`).
    pub fn folder_tag(&self) -> String {
        match self {
            SamplingMode::ByCount(n) => format!("n{n}"),
            SamplingMode::ByDistance(d) => format!("sd{d}um"),
        }
    }
}

/// Stride and offset through a stack of `total_count` slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplingPlan {
    pub total_count: usize,
    pub step_width: usize,
    pub start_offset: usize,
}

/// Compute the sampling plan, drawing the random start offset from `rng`.
pub fn build_plan<R: Rng + ?Sized>(
    total_count: usize,
    mode: SamplingMode,
    pixel_size_um: f64,
    rng: &mut R,
) -> Result<SamplingPlan, SamplingError> {
    mode.validate()?;
    if total_count == 0 {
        return Err(SamplingError::EmptyStack);
    }
    if !(pixel_size_um.is_finite() && pixel_size_um > 0.0) {
        return Err(SamplingError::NonPositiveValue("Pixel size"));
    }

    let step_width = match mode {
        SamplingMode::ByCount(n) => total_count / n as usize,
        SamplingMode::ByDistance(d) => (d / pixel_size_um).floor() as usize,
    };
    if step_width == 0 {
        let requested = match mode {
            SamplingMode::ByCount(n) => format!("{n} slices"),
            SamplingMode::ByDistance(d) => {
                format!("slices {d} um apart at {pixel_size_um} um per slice")
            }
        };
        return Err(SamplingError::TooFewSlices {
            requested,
            total: total_count,
        });
    }

    // A stride longer than the stack lets the offset fall past the last slice
    if step_width > total_count {
        if let SamplingMode::ByDistance(distance_um) = mode {
            return Err(SamplingError::StepExceedsStack {
                distance_um,
                step_width,
                total: total_count,
            });
        }
    }

    let start_offset = rng.random_range(0..step_width);
    Ok(SamplingPlan {
        total_count,
        step_width,
        start_offset,
    })
}

impl SamplingPlan {
    /// Stack indices to export, in increasing depth order.
    pub fn selected_indices(&self) -> impl Iterator<Item = usize> + use<> {
        (self.start_offset..self.total_count).step_by(self.step_width)
    }

    /// Number of slices the plan selects.
    pub fn selected_count(&self) -> usize {
        self.total_count
            .saturating_sub(self.start_offset)
            .div_ceil(self.step_width)
    }

    /// Pair every selected slice with its 1-based sequence number.
    pub fn select<'a>(&self, slices: &'a [PathBuf]) -> Vec<(usize, &'a Path)> {
        self.selected_indices()
            .filter_map(|i| slices.get(i))
            .enumerate()
            .map(|(n, path)| (n + 1, path.as_path()))
            .collect()
    }
}
