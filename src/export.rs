//! Slice export: the whole run from sample folder to STEPanizer folder.
//!
//! ## Steps
//!
//! 1. List the reconstruction stack (`{sample}/rec/*rec*.png`, sorted).
//! 2. Resolve the pixel size (override or scan log).
//! 3. Build the sampling plan (one random offset).
//! 4. Resolve scale-bar length and, if requested, the resize fraction from
//!    the first slice's header, and check the bar fits into that slice. A
//!    refused upscale or an oversized bar stops here, before any output.
//! 5. Create the output folder. An existing folder is never reused.
//! 6. Export every selected slice: decode → stamp → resize → encode → log.
//! 7. Write `selection.json` and close the run log.
//!
//! ## Output Structure
//!
//! ```text
//! SampleA/
//! ├── rec/
//! │   ├── SampleA_rec.log
//! │   └── SampleA_rec00000000.png ...
//! └── STEPanizer_n10_pixelsize11um_scalebar1000um/
//!     ├── SampleA_1.jpg
//!     ├── ...
//!     ├── SampleA_10.jpg
//!     ├── STEPanizerizer.log
//!     └── selection.json
//! ```
//!
//! ## Failure Policy
//!
//! Every error is fatal. A partial stack is useless for counting, so a slice
//! that fails aborts the run; the run log keeps the lines written so far plus
//! an abort line.
//!
//! ## Parallel Export
//!
//! With `processing.max_threads > 1` slices are exported on a local
//! [rayon](https://docs.rs/rayon) pool. Sequence numbers come from the plan,
//! not from completion order, and the run log serializes its writes.

use crate::calibration::{self, CalibrationError};
use crate::config::{ConfigError, RunConfig, Settings, effective_threads};
use crate::context::{CancelFlag, LogSink, RunContext, RunLog};
use crate::imaging::{
    ImageBackend, OperationError, Quality, RustBackend, ScaleBar, SliceTransform, export_slice,
    get_longest_side, plan_from_header,
};
use crate::naming::{self, FolderParams};
use crate::output::{self, OutputRecord};
use crate::sampling::{self, SamplingError, SamplingMode, SamplingPlan};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Version recorded in the run log banner and manifest.
pub const VERSION: &str = env!("STEPANIZERIZER_VERSION");

/// Name of the machine-readable run manifest.
pub const MANIFEST_NAME: &str = "selection.json";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error("{source_name}: {error}")]
    Slice {
        source_name: String,
        #[source]
        error: OperationError,
    },
    #[error("Reconstruction folder {0} not found, the slices must be in this subfolder of the sample folder")]
    MissingRecFolder(PathBuf),
    #[error("No reconstructions (*{marker}*.{extension}) found in {dir}")]
    NoSlices {
        dir: PathBuf,
        marker: String,
        extension: String,
    },
    #[error("Output folder {0} already exists, remove or rename it first")]
    OutputFolderExists(PathBuf),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Cancelled after {completed} exported slices")]
    Cancelled { completed: usize },
}

/// Error taxonomy for operator-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or contradictory options, missing calibration source.
    Configuration,
    /// Request that cannot be fulfilled (upscale, empty plan, stamp, collision).
    Validation,
    /// Unreadable input or unwritable output.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorCategory::Configuration => "configuration error",
            ErrorCategory::Validation => "validation error",
            ErrorCategory::Io => "I/O error",
        })
    }
}

impl ExportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExportError::Io(_) | ExportError::Json(_) | ExportError::ThreadPool(_) => {
                ErrorCategory::Io
            }
            ExportError::Config(ConfigError::Io(_)) => ErrorCategory::Io,
            ExportError::Config(_) => ErrorCategory::Configuration,
            ExportError::Calibration(
                CalibrationError::WouldUpscale { .. } | CalibrationError::ScalebarTooShort { .. },
            ) => ErrorCategory::Validation,
            ExportError::Calibration(_) => ErrorCategory::Configuration,
            ExportError::Sampling(
                SamplingError::ModeConflict | SamplingError::ModeMissing,
            ) => ErrorCategory::Configuration,
            ExportError::Sampling(_) => ErrorCategory::Validation,
            ExportError::Slice {
                error: OperationError::StampOutOfBounds { .. },
                ..
            } => ErrorCategory::Validation,
            ExportError::Slice { .. } => ErrorCategory::Io,
            ExportError::MissingRecFolder(_) => ErrorCategory::Configuration,
            ExportError::NoSlices { .. } | ExportError::OutputFolderExists(_) => {
                ErrorCategory::Validation
            }
            ExportError::Cancelled { .. } => ErrorCategory::Io,
        }
    }
}

/// Calibration and plan, resolved before any output is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub rec_dir: PathBuf,
    pub slices: Vec<PathBuf>,
    pub pixel_size_um: f64,
    pub plan: SamplingPlan,
    pub scalebar_px: Option<u32>,
    /// Longest side of the first slice, when a resize was requested.
    pub longest_side_px: Option<u32>,
    pub resize_fraction: Option<f64>,
    /// What happens to every selected slice, checked against the first one.
    pub transform: SliceTransform,
    pub prefix: String,
    pub output_dir: PathBuf,
}

/// Machine-readable record of a run, written as `selection.json`.
#[derive(Debug, Serialize)]
pub struct RunManifest {
    pub version: String,
    pub sample_folder: PathBuf,
    pub mode: SamplingMode,
    pub pixel_size_um: f64,
    pub scalebar_um: Option<u32>,
    pub scalebar_px: Option<u32>,
    pub resize_fraction: Option<f64>,
    pub plan: SamplingPlan,
    pub records: Vec<OutputRecord>,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub plan: SamplingPlan,
    pub scalebar_px: Option<u32>,
    pub resize_fraction: Option<f64>,
    pub records: Vec<OutputRecord>,
}

/// Run the export with the pure Rust image backend.
pub fn run(
    config: &RunConfig,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<RunSummary, ExportError> {
    run_with_backend(&RustBackend::new(), config, settings, ctx)
}

/// Resolve everything that does not require writing: slices, calibration,
/// plan, scale bar, resize fraction, output names.
pub fn prepare(
    backend: &impl ImageBackend,
    config: &RunConfig,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<ExportPlan, ExportError> {
    let rec_dir = config.sample_folder.join(&settings.input.rec_subfolder);
    if !rec_dir.is_dir() {
        return Err(ExportError::MissingRecFolder(rec_dir));
    }
    let slices = naming::collect_slices(&rec_dir, &settings.input)?;
    if slices.is_empty() {
        return Err(ExportError::NoSlices {
            dir: rec_dir,
            marker: settings.input.slice_marker.clone(),
            extension: settings.input.extension.clone(),
        });
    }

    let pixel_size_um = match config.pixel_size_um {
        Some(px) => px,
        None => {
            let log_text = match calibration::find_scan_log(&rec_dir)? {
                Some(log) => {
                    debug!(log = %log.display(), "reading pixel size from scan log");
                    Some(fs::read_to_string(&log)?)
                }
                None => None,
            };
            calibration::resolve_pixel_size(
                log_text.as_deref(),
                None,
                &settings.calibration,
                &rec_dir,
            )?
        }
    };

    let plan = sampling::build_plan(slices.len(), config.mode, pixel_size_um, &mut ctx.rng)?;
    info!(
        total = plan.total_count,
        step = plan.step_width,
        offset = plan.start_offset,
        "sampling plan"
    );

    let scalebar_px = calibration::resolve_scalebar_pixels(config.scalebar_um, pixel_size_um)?;

    let first = &slices[0];
    let slice_error = |error: OperationError| ExportError::Slice {
        source_name: display_name(first),
        error,
    };
    let (longest_side_px, resize_fraction) = match config.resize_longest_side_px {
        Some(requested) => {
            let longest = get_longest_side(backend, first).map_err(slice_error)?;
            let fraction = calibration::resolve_resize_fraction(requested, longest)?;
            (Some(longest), Some(fraction))
        }
        None => (None, None),
    };

    let transform = SliceTransform {
        scalebar: scalebar_px.map(|length_px| ScaleBar {
            length_px,
            margin: settings.scalebar.margin,
            brightness: settings.scalebar.brightness,
        }),
        resize_fraction,
        quality: Quality::new(settings.output.quality),
    };
    if transform.scalebar.is_some() {
        let checked = plan_from_header(backend, first, &transform).map_err(slice_error)?;
        debug!(?checked, "first slice accepts the transform");
    }

    let fallback = display_name(&config.sample_folder);
    let prefix = naming::output_prefix(&slices, &fallback);
    let mode_tag = config.mode.folder_tag();
    let folder = naming::output_folder_name(&FolderParams {
        folder_prefix: &settings.output.folder_prefix,
        mode_tag: &mode_tag,
        pixel_size_um,
        scalebar_um: config.scalebar_um,
        resize_px: config.resize_longest_side_px,
    });

    Ok(ExportPlan {
        output_dir: config.sample_folder.join(folder),
        rec_dir,
        slices,
        pixel_size_um,
        plan,
        scalebar_px,
        longest_side_px,
        resize_fraction,
        transform,
        prefix,
    })
}

/// Run the export with a specific backend (allows testing with mock).
pub fn run_with_backend(
    backend: &impl ImageBackend,
    config: &RunConfig,
    settings: &Settings,
    ctx: &mut RunContext,
) -> Result<RunSummary, ExportError> {
    let sink = ctx.sink.clone();
    let export = prepare(backend, config, settings, ctx)?;

    sink.console(&output::format_pixel_size(export.pixel_size_um));
    for line in output::format_found(&export.rec_dir, export.slices.len()) {
        sink.console(&line);
    }
    sink.console(&output::format_selection(
        &config.mode,
        &export.plan,
        &export.output_dir,
    ));

    // create_dir, not create_dir_all: an existing folder must fail the run
    match fs::create_dir(&export.output_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ExportError::OutputFolderExists(export.output_dir));
        }
        Err(e) => return Err(e.into()),
    }

    let log = Logger {
        file: RunLog::create(&export.output_dir.join(&settings.output.log_name))?,
        sink,
        cancel: ctx.cancel.clone(),
    };
    write_header(&log, &ctx.command_line, config, &export)?;

    match export_selected(backend, &log, config, settings, &export) {
        Ok(records) => {
            let manifest = RunManifest {
                version: VERSION.to_string(),
                sample_folder: config.sample_folder.clone(),
                mode: config.mode,
                pixel_size_um: export.pixel_size_um,
                scalebar_um: config.scalebar_um,
                scalebar_px: export.scalebar_px,
                resize_fraction: export.resize_fraction,
                plan: export.plan,
                records,
            };
            fs::write(
                export.output_dir.join(MANIFEST_NAME),
                serde_json::to_string_pretty(&manifest)?,
            )?;

            log.log(&output::separator())?;
            log.log(&output::format_finished(&now()))?;
            info!(count = manifest.records.len(), dir = %export.output_dir.display(), "export complete");

            Ok(RunSummary {
                output_dir: export.output_dir,
                plan: export.plan,
                scalebar_px: export.scalebar_px,
                resize_fraction: export.resize_fraction,
                records: manifest.records,
            })
        }
        Err(e) => {
            warn!(error = %e, "export aborted");
            log.log(&output::format_aborted(&now(), &e.to_string()))?;
            Err(e)
        }
    }
}

/// Writes run log lines to the file and mirrors them into the sink.
struct Logger {
    file: RunLog,
    sink: Arc<dyn LogSink>,
    cancel: CancelFlag,
}

impl Logger {
    fn log(&self, line: &str) -> Result<(), ExportError> {
        self.file.write_line(line)?;
        self.sink.log(line);
        Ok(())
    }
}

fn write_header(
    log: &Logger,
    command_line: &str,
    config: &RunConfig,
    export: &ExportPlan,
) -> Result<(), ExportError> {
    for line in output::format_banner(VERSION, command_line) {
        log.log(&line)?;
    }
    log.log(&output::format_started(&now()))?;
    log.log(&output::separator())?;
    log.log(&output::format_transfer(
        export.plan.selected_count(),
        &absolute(&export.rec_dir),
        &absolute(&export.output_dir),
    ))?;

    if let (Some(longest), Some(fraction)) = (export.longest_side_px, export.resize_fraction) {
        log.log(&output::format_resize(longest, fraction))?;
    }
    if let (Some(um), Some(px)) = (config.scalebar_um, export.scalebar_px) {
        log.sink.console(&output::format_scalebar_pixels(um, px, export.resize_fraction));
        log.log(&output::format_scalebar_log(um))?;
    }
    log.log(&output::sampling_notice())?;
    log.log(&output::separator())?;
    Ok(())
}

fn export_selected(
    backend: &impl ImageBackend,
    log: &Logger,
    config: &RunConfig,
    settings: &Settings,
    export: &ExportPlan,
) -> Result<Vec<OutputRecord>, ExportError> {
    let selected = export.plan.select(&export.slices);
    let total = selected.len();
    let threads = effective_threads(&settings.processing);
    debug!(threads, total, verbose = config.verbose, "exporting slices");
    let completed = AtomicUsize::new(0);

    let export_one = |&(sequence_index, source): &(usize, &Path)| -> Result<OutputRecord, ExportError> {
        if log.cancel.is_cancelled() {
            return Err(ExportError::Cancelled {
                completed: completed.load(Ordering::SeqCst),
            });
        }
        let record = OutputRecord {
            sequence_index,
            source_name: display_name(source),
            output_name: naming::output_file_name(&export.prefix, sequence_index),
        };
        let plan = export_slice(
            backend,
            source,
            &export.output_dir.join(&record.output_name),
            &export.transform,
        )
        .map_err(|error| ExportError::Slice {
            source_name: record.source_name.clone(),
            error,
        })?;
        debug!(?plan, source = %record.source_name, "slice exported");

        let line = output::format_record(&record, total);
        log.sink.console(&line);
        log.log(&line)?;
        completed.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    };

    if threads <= 1 {
        return selected.iter().map(export_one).collect();
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let mut records: Vec<OutputRecord> =
        pool.install(|| selected.par_iter().map(export_one).collect::<Result<_, _>>())?;
    records.sort_by_key(|r| r.sequence_index);
    Ok(records)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn now() -> String {
    output::format_timestamp(&chrono::Local::now())
}
