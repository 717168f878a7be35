//! Run configuration.
//!
//! Two layers feed a run:
//!
//! - [`RunConfig`]: what the operator asked for on the command line (sample
//!   folder, sampling mode, pixel-size override, scale bar, resize). Built from
//!   the raw [`RunOptions`] by a single validation pass, [`RunConfig::from_options`].
//! - [`Settings`]: tunables that rarely change between runs (folder names,
//!   calibration labels, scale-bar margin, JPEG quality, worker threads). Stock
//!   defaults, optionally overridden by a sparse TOML file.
//!
//! ## Settings File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [input]
//! rec_subfolder = "rec"      # Reconstruction folder inside the sample folder
//! slice_marker = "rec"       # Substring every slice file name contains
//! extension = "png"          # Slice file extension
//!
//! [calibration]
//! label = "Image Pixel"      # Scan log line carrying the pixel size
//! exclude = "Scaled"         # Skip lines containing this (post-scaling size)
//!
//! [scalebar]
//! margin = 200               # Distance (px) of the bar from the bottom-right corner
//! brightness = 255           # Gray value the bar is drawn with
//!
//! [output]
//! folder_prefix = "STEPanizer"
//! log_name = "STEPanizerizer.log"
//! quality = 90               # JPEG quality (1-100)
//!
//! [processing]
//! max_threads = 1            # Slices exported in parallel (1 = sequential)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::sampling::{SamplingError, SamplingMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("You need to give a sample folder as input (with the \"-f\" option)")]
    MissingSampleFolder,
    #[error("Please give a correct (i.e. existing) folder as input: {0}")]
    SampleFolderNotFound(PathBuf),
    #[error("{0}")]
    Sampling(#[from] SamplingError),
    #[error("Disector functionality is not implemented")]
    DisectorNotImplemented,
}

// =============================================================================
// Command-line run configuration
// =============================================================================

/// Default scale-bar length in µm.
pub const DEFAULT_SCALEBAR_UM: u32 = 1000;

/// Raw, unvalidated options as they come off the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub sample_folder: Option<PathBuf>,
    pub file_count: Option<u32>,
    pub slice_distance_um: Option<f64>,
    pub pixel_size_um: Option<f64>,
    pub disector_thickness_um: Option<f64>,
    pub scalebar_um: Option<u32>,
    pub resize_longest_side_px: Option<u32>,
    pub verbose: bool,
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub sample_folder: PathBuf,
    pub mode: SamplingMode,
    pub pixel_size_um: Option<f64>,
    /// Scale-bar length in µm; `None` disables the bar.
    pub scalebar_um: Option<u32>,
    pub resize_longest_side_px: Option<u32>,
    pub verbose: bool,
}

impl RunConfig {
    /// Validate the raw options in one pass.
    ///
    /// Checks, in order: sample folder given and existing, disector not
    /// requested, exactly one sampling mode with a positive value, positive
    /// pixel-size override, positive resize target.
    pub fn from_options(options: RunOptions) -> Result<Self, ConfigError> {
        let sample_folder = options
            .sample_folder
            .ok_or(ConfigError::MissingSampleFolder)?;
        if !sample_folder.is_dir() {
            return Err(ConfigError::SampleFolderNotFound(sample_folder));
        }
        if options.disector_thickness_um.is_some() {
            return Err(ConfigError::DisectorNotImplemented);
        }

        let mode = SamplingMode::from_flags(options.file_count, options.slice_distance_um)?;

        if let Some(px) = options.pixel_size_um.filter(|px| !(px.is_finite() && *px > 0.0)) {
            return Err(ConfigError::Validation(format!(
                "pixel size must be positive, got {px}"
            )));
        }
        if options.resize_longest_side_px == Some(0) {
            return Err(ConfigError::Validation(
                "resize side length must be positive".into(),
            ));
        }

        Ok(Self {
            sample_folder,
            mode,
            pixel_size_um: options.pixel_size_um,
            scalebar_um: options.scalebar_um.filter(|&um| um > 0),
            resize_longest_side_px: options.resize_longest_side_px,
            verbose: options.verbose,
        })
    }
}

// =============================================================================
// Settings (TOML tunables)
// =============================================================================

/// Tunables loaded from an optional settings file.
///
/// All fields have defaults. A settings file only needs the values it wants
/// to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub input: InputSettings,
    pub calibration: CalibrationSettings,
    pub scalebar: ScalebarSettings,
    pub output: OutputSettings,
    pub processing: ProcessingSettings,
}

impl Settings {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.quality == 0 || self.output.quality > 100 {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.calibration.label.is_empty() {
            return Err(ConfigError::Validation(
                "calibration.label must not be empty".into(),
            ));
        }
        if self.output.folder_prefix.is_empty() || self.output.log_name.is_empty() {
            return Err(ConfigError::Validation(
                "output.folder_prefix and output.log_name must not be empty".into(),
            ));
        }
        if self.processing.max_threads == 0 {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Where the reconstruction stack lives inside the sample folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    pub rec_subfolder: String,
    /// Substring every slice file name contains (`*rec*.png`).
    pub slice_marker: String,
    pub extension: String,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            rec_subfolder: "rec".to_string(),
            slice_marker: "rec".to_string(),
            extension: "png".to_string(),
        }
    }
}

/// Scan log labels for the pixel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationSettings {
    /// Substring of the authoritative pixel-size line.
    pub label: String,
    /// Lines containing this are skipped (post-processing scaled size).
    pub exclude: String,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            label: "Image Pixel".to_string(),
            exclude: "Scaled".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScalebarSettings {
    /// Distance in px between the bar and the right/bottom image edges.
    pub margin: u32,
    pub brightness: u8,
}

impl Default for ScalebarSettings {
    fn default() -> Self {
        Self {
            margin: 200,
            brightness: 255,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub folder_prefix: String,
    pub log_name: String,
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            folder_prefix: "STEPanizer".to_string(),
            log_name: "STEPanizerizer.log".to_string(),
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingSettings {
    /// Number of slices exported in parallel. Clamped to the core count.
    pub max_threads: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self { max_threads: 1 }
    }
}

/// Resolve the effective worker count: `min(max_threads, cores)`.
pub fn effective_threads(config: &ProcessingSettings) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.clamp(1, cores)
}

/// Returns the stock default settings as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(Settings::default())
        .map_err(|e| ConfigError::Validation(format!("default settings must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a sparse settings document and merge it over the stock defaults.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, or the stock defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => parse_settings(&fs::read_to_string(path)?),
        None => Ok(Settings::default()),
    }
}

/// A fully commented stock settings file, printed by `--gen-config`.
pub fn stock_settings_toml() -> &'static str {
    r##"# STEPanizerizer settings
# ========================
# Pass with --config <file>. Every key is optional; omitted keys keep the
# defaults shown here.

[input]
# Folder inside the sample folder holding the reconstructed slices.
rec_subfolder = "rec"
# Only files whose name contains this marker are treated as slices.
slice_marker = "rec"
# Slice file extension (case-insensitive).
extension = "png"

[calibration]
# The first scan log line containing `label` but not `exclude` carries the
# pixel size after its '=' sign.
label = "Image Pixel"
exclude = "Scaled"

[scalebar]
# Distance in pixels between the scale bar and the bottom/right image edges.
margin = 200
# Gray value of the bar (255 = white).
brightness = 255

[output]
# Output folder name starts with this, followed by the run parameters.
folder_prefix = "STEPanizer"
# Name of the run log written into the output folder.
log_name = "STEPanizerizer.log"
# JPEG quality, 1-100.
quality = 90

[processing]
# Slices exported in parallel. 1 keeps the export strictly sequential.
max_threads = 1
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(folder: &Path) -> RunOptions {
        RunOptions {
            sample_folder: Some(folder.to_path_buf()),
            file_count: Some(15),
            scalebar_um: Some(DEFAULT_SCALEBAR_UM),
            ..Default::default()
        }
    }

    // =========================================================================
    // RunConfig validation
    // =========================================================================

    #[test]
    fn valid_options_build_config() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig::from_options(options(tmp.path())).unwrap();
        assert_eq!(config.mode, SamplingMode::ByCount(15));
        assert_eq!(config.scalebar_um, Some(1000));
        assert_eq!(config.pixel_size_um, None);
    }

    #[test]
    fn missing_folder_is_error() {
        let result = RunConfig::from_options(RunOptions {
            file_count: Some(15),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingSampleFolder)));
    }

    #[test]
    fn nonexistent_folder_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(options(&tmp.path().join("nope")));
        assert!(matches!(result, Err(ConfigError::SampleFolderNotFound(_))));
    }

    #[test]
    fn disector_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(RunOptions {
            disector_thickness_um: Some(5.3),
            ..options(tmp.path())
        });
        assert!(matches!(result, Err(ConfigError::DisectorNotImplemented)));
    }

    #[test]
    fn both_modes_conflict() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(RunOptions {
            slice_distance_um: Some(50.0),
            ..options(tmp.path())
        });
        assert!(matches!(
            result,
            Err(ConfigError::Sampling(SamplingError::ModeConflict))
        ));
    }

    #[test]
    fn neither_mode_is_missing() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(RunOptions {
            file_count: None,
            ..options(tmp.path())
        });
        assert!(matches!(
            result,
            Err(ConfigError::Sampling(SamplingError::ModeMissing))
        ));
    }

    #[test]
    fn zero_scalebar_disables() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig::from_options(RunOptions {
            scalebar_um: Some(0),
            ..options(tmp.path())
        })
        .unwrap();
        assert_eq!(config.scalebar_um, None);
    }

    #[test]
    fn negative_pixel_size_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(RunOptions {
            pixel_size_um: Some(-1.0),
            ..options(tmp.path())
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_resize_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = RunConfig::from_options(RunOptions {
            resize_longest_side_px: Some(0),
            ..options(tmp.path())
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Settings loading
    // =========================================================================

    #[test]
    fn default_settings_values() {
        let settings = Settings::default();
        assert_eq!(settings.input.rec_subfolder, "rec");
        assert_eq!(settings.calibration.label, "Image Pixel");
        assert_eq!(settings.calibration.exclude, "Scaled");
        assert_eq!(settings.scalebar.margin, 200);
        assert_eq!(settings.scalebar.brightness, 255);
        assert_eq!(settings.output.log_name, "STEPanizerizer.log");
        assert_eq!(settings.processing.max_threads, 1);
        settings.validate().unwrap();
    }

    #[test]
    fn sparse_override_keeps_other_defaults() {
        let settings = parse_settings("[scalebar]\nmargin = 50\n").unwrap();
        assert_eq!(settings.scalebar.margin, 50);
        assert_eq!(settings.scalebar.brightness, 255);
        assert_eq!(settings.output.quality, 90);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let result = parse_settings("[scalebar]\nmargn = 50\n");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_quality_is_rejected() {
        let result = parse_settings("[output]\nquality = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let result = parse_settings("[processing]\nmax_threads = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn stock_settings_file_parses_to_defaults() {
        let settings = parse_settings(stock_settings_toml()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_settings_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.toml");
        fs::write(&path, "[input]\nrec_subfolder = \"rec_IR\"\n").unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.input.rec_subfolder, "rec_IR");
    }

    #[test]
    fn load_settings_without_path_is_default() {
        assert_eq!(load_settings(None).unwrap(), Settings::default());
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn effective_threads_is_at_least_one() {
        assert!(effective_threads(&ProcessingSettings { max_threads: 1 }) == 1);
        assert!(effective_threads(&ProcessingSettings { max_threads: 64 }) >= 1);
    }
}
