//! # STEPanizerizer
//!
//! Prepares a tomographic reconstruction stack for stereological counting with
//! [STEPanizer](http://www.stepanizer.com/). From a folder of hundreds or
//! thousands of slices it picks a small, unbiased subset, stamps a calibrated
//! scale bar into each, optionally downsizes them, and writes them as
//! sequentially numbered JPEGs with a run log documenting exactly what was done.
//!
//! # Pipeline
//!
//! ```text
//! SampleA/rec/*rec*.png ──┐
//! SampleA/rec/*.log ──────┼─→  calibration  →  sampling plan  →  export
//! command line ───────────┘     (pixel size)    (step, offset)    (stamp, resize, JPEG)
//! ```
//!
//! Everything up to the sampling plan is resolved before the first byte is
//! written, so an impossible request (too few slices, an upscale, missing
//! calibration) leaves the sample folder untouched.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | CLI option validation and the optional `settings.toml` tunables |
//! | [`calibration`] | Pixel size from the scan log, scale-bar length, resize fraction |
//! | [`sampling`] | Systematic uniform random sampling plan |
//! | [`naming`] | Slice discovery, output prefix, output file and folder names |
//! | [`imaging`] | Decode, stamp, resize, encode: pure-Rust image operations |
//! | [`export`] | The run itself: plan, create the output folder, export, log |
//! | [`context`] | Injected randomness, line sinks, cancellation, run log file |
//! | [`output`] | Console and run-log line formatting |
//!
//! # Design Decisions
//!
//! ## Systematic Uniform Random Sampling
//!
//! Slices are taken at a fixed step from a single random start within the
//! first step. Every slice has the same probability of being selected, which
//! is what makes the counts unbiased. The start is drawn from the RNG in the
//! [`context::RunContext`], so tests pass a seeded generator and get a
//! reproducible plan.
//!
//! ## Stamp Before Resize
//!
//! The scale bar length is computed from the scan's pixel size, so it is
//! stamped into the full-resolution slice. Resizing afterwards shrinks bar and
//! image together and the bar stays correct.
//!
//! ## Never Overwrite
//!
//! The output folder name encodes the run parameters and is created with
//! `create_dir`. A second run with the same parameters fails instead of mixing
//! two random selections in one folder.

pub mod calibration;
pub mod config;
pub mod context;
pub mod export;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod sampling;
