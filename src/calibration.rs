//! Physical-to-pixel calibration.
//!
//! Turns scan metadata and user overrides into the numbers the exporter works
//! with: the pixel (voxel) size in µm, the scale-bar length in pixels and the
//! resize fraction.
//!
//! ## Pixel Size
//!
//! Bruker reconstruction logs list the pixel size twice, once raw and once
//! after post-processing scaling:
//!
//! ```text
//! Image Pixel Size (um)=11.000000
//! Scaled Image Pixel Size (um)=11.000000
//! ```
//!
//! The first line carrying the label (`Image Pixel`) but not the exclusion
//! marker (`Scaled`) is authoritative. An explicit override always wins.
//!
//! All functions here are pure except [`find_scan_log`], which lists a directory.

use crate::config::CalibrationSettings;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("No scan log found in {0} and no pixel size given (use --pixel-size)")]
    MissingCalibration(PathBuf),
    #[error("No line containing \"{label}\" (without \"{exclude}\") in the scan log")]
    LabelNotFound { label: String, exclude: String },
    #[error("Could not read a pixel size from log line: {0}")]
    MalformedPixelSize(String),
    #[error("Pixel size must be a positive number, got {0}")]
    InvalidPixelSize(f64),
    #[error("We will not upscale images (from {actual} px to {requested} px)")]
    WouldUpscale { requested: u32, actual: u32 },
    #[error("A scale bar of {scalebar_um} um is shorter than one pixel at {pixel_size_um} um per pixel")]
    ScalebarTooShort { scalebar_um: u32, pixel_size_um: f64 },
}

/// Find the scan log in a reconstruction folder: the first `*.log` by name.
pub fn find_scan_log(rec_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(rec_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("log"))
        })
        .collect();
    logs.sort();
    Ok(logs.into_iter().next())
}

/// Resolve the pixel size in µm.
///
/// `log_text` is the content of the scan log, `None` when no log was found.
/// `source` names where the log was looked for and only feeds the error message.
pub fn resolve_pixel_size(
    log_text: Option<&str>,
    override_um: Option<f64>,
    labels: &CalibrationSettings,
    source: &Path,
) -> Result<f64, CalibrationError> {
    if let Some(value) = override_um {
        return validate_pixel_size(value);
    }
    let text = log_text.ok_or_else(|| CalibrationError::MissingCalibration(source.to_path_buf()))?;

    let line = text
        .lines()
        .find(|line| line.contains(&labels.label) && !line.contains(&labels.exclude))
        .ok_or_else(|| CalibrationError::LabelNotFound {
            label: labels.label.clone(),
            exclude: labels.exclude.clone(),
        })?;

    let value = line
        .split_once('=')
        .and_then(|(_, v)| v.trim().parse::<f64>().ok())
        .ok_or_else(|| CalibrationError::MalformedPixelSize(line.trim().to_string()))?;
    validate_pixel_size(value)
}

fn validate_pixel_size(value: f64) -> Result<f64, CalibrationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CalibrationError::InvalidPixelSize(value))
    }
}

/// Scale-bar length in pixels: `round(scalebar_um / pixel_size_um)`.
///
/// Returns `None` when the scale bar is disabled (unset or zero length), and
/// an error when the requested length rounds to zero pixels.
pub fn resolve_scalebar_pixels(
    scalebar_um: Option<u32>,
    pixel_size_um: f64,
) -> Result<Option<u32>, CalibrationError> {
    match scalebar_um {
        Some(um) if um > 0 => match (um as f64 / pixel_size_um).round() as u32 {
            0 => Err(CalibrationError::ScalebarTooShort {
                scalebar_um: um,
                pixel_size_um,
            }),
            px => Ok(Some(px)),
        },
        _ => Ok(None),
    }
}

/// Fraction that brings the longest image side down to `requested_side_px`.
///
/// The same fraction is applied to both axes, so non-square slices keep their
/// aspect ratio. Upscaling is refused.
pub fn resolve_resize_fraction(
    requested_side_px: u32,
    actual_longest_side_px: u32,
) -> Result<f64, CalibrationError> {
    if requested_side_px > actual_longest_side_px {
        return Err(CalibrationError::WouldUpscale {
            requested: requested_side_px,
            actual: actual_longest_side_px,
        });
    }
    Ok(requested_side_px as f64 / actual_longest_side_px as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BRUKER_LOG: &str = "\
[System]
Scanner=Skyscan1272
[Acquisition]
Image Pixel Size (um)=11.000000
Scaled Image Pixel Size (um)=22.000000
[Reconstruction]
Result File Type=PNG
";

    fn labels() -> CalibrationSettings {
        CalibrationSettings::default()
    }

    fn resolve(text: Option<&str>, override_um: Option<f64>) -> Result<f64, CalibrationError> {
        resolve_pixel_size(text, override_um, &labels(), Path::new("/scan/rec"))
    }

    // =========================================================================
    // resolve_pixel_size
    // =========================================================================

    #[test]
    fn reads_raw_pixel_size_not_scaled() {
        assert_eq!(resolve(Some(BRUKER_LOG), None).unwrap(), 11.0);
    }

    #[test]
    fn scaled_line_first_is_skipped() {
        let text = "Scaled Image Pixel Size (um)=5.5\nImage Pixel Size (um)=2.75\n";
        assert_eq!(resolve(Some(text), None).unwrap(), 2.75);
    }

    #[test]
    fn first_matching_line_wins() {
        let text = "Image Pixel Size (um)=4.0\nImage Pixel Size (um)=8.0\n";
        assert_eq!(resolve(Some(text), None).unwrap(), 4.0);
    }

    #[test]
    fn override_wins_over_log() {
        assert_eq!(resolve(Some(BRUKER_LOG), Some(5.3)).unwrap(), 5.3);
    }

    #[test]
    fn override_without_log() {
        assert_eq!(resolve(None, Some(7.0)).unwrap(), 7.0);
    }

    #[test]
    fn missing_log_and_override_is_error() {
        assert!(matches!(
            resolve(None, None),
            Err(CalibrationError::MissingCalibration(_))
        ));
    }

    #[test]
    fn label_absent_is_error() {
        let result = resolve(Some("[System]\nScanner=Skyscan1172\n"), None);
        assert!(matches!(result, Err(CalibrationError::LabelNotFound { .. })));
    }

    #[test]
    fn only_scaled_line_is_label_not_found() {
        let result = resolve(Some("Scaled Image Pixel Size (um)=5.5\n"), None);
        assert!(matches!(result, Err(CalibrationError::LabelNotFound { .. })));
    }

    #[test]
    fn unparseable_value_is_error() {
        let result = resolve(Some("Image Pixel Size (um)=eleven\n"), None);
        assert!(matches!(result, Err(CalibrationError::MalformedPixelSize(_))));
    }

    #[test]
    fn zero_override_is_rejected() {
        assert_eq!(
            resolve(None, Some(0.0)),
            Err(CalibrationError::InvalidPixelSize(0.0))
        );
    }

    #[test]
    fn custom_labels() {
        let labels = CalibrationSettings {
            label: "Pixel Size".to_string(),
            exclude: "Camera".to_string(),
        };
        let text = "Camera Pixel Size (um)=9.0\nPixel Size (um)=3.5\n";
        let value = resolve_pixel_size(Some(text), None, &labels, Path::new("rec")).unwrap();
        assert_eq!(value, 3.5);
    }

    // =========================================================================
    // find_scan_log
    // =========================================================================

    #[test]
    fn finds_first_log_by_name() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b_rec.log"), "").unwrap();
        fs::write(tmp.path().join("a_rec.log"), "").unwrap();
        fs::write(tmp.path().join("a_rec0001.png"), "").unwrap();

        let log = find_scan_log(tmp.path()).unwrap().unwrap();
        assert_eq!(log.file_name().unwrap(), "a_rec.log");
    }

    #[test]
    fn no_log_returns_none() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a_rec0001.png"), "").unwrap();
        assert_eq!(find_scan_log(tmp.path()).unwrap(), None);
    }

    // =========================================================================
    // resolve_scalebar_pixels / resolve_resize_fraction
    // =========================================================================

    #[test]
    fn scalebar_pixels_round() {
        assert_eq!(resolve_scalebar_pixels(Some(1000), 10.0), Ok(Some(100)));
        assert_eq!(resolve_scalebar_pixels(Some(1000), 11.0), Ok(Some(91)));
    }

    #[test]
    fn scalebar_below_one_pixel_is_error() {
        assert_eq!(
            resolve_scalebar_pixels(Some(1), 11.0),
            Err(CalibrationError::ScalebarTooShort {
                scalebar_um: 1,
                pixel_size_um: 11.0
            })
        );
        // 6 um at 11 um/px still rounds up to one pixel
        assert_eq!(resolve_scalebar_pixels(Some(6), 11.0), Ok(Some(1)));
    }

    #[test]
    fn scalebar_zero_or_unset_disables() {
        assert_eq!(resolve_scalebar_pixels(Some(0), 10.0), Ok(None));
        assert_eq!(resolve_scalebar_pixels(None, 10.0), Ok(None));
    }

    #[test]
    fn scalebar_is_deterministic() {
        let first = resolve_scalebar_pixels(Some(250), 5.3);
        let second = resolve_scalebar_pixels(Some(250), 5.3);
        assert_eq!(first, second);
        assert_eq!(first, Ok(Some(47)));
    }

    #[test]
    fn resize_fraction_downscale() {
        assert_eq!(resolve_resize_fraction(1000, 2000).unwrap(), 0.5);
    }

    #[test]
    fn resize_fraction_same_size_is_one() {
        assert_eq!(resolve_resize_fraction(1600, 1600).unwrap(), 1.0);
    }

    #[test]
    fn resize_fraction_refuses_upscale() {
        assert_eq!(
            resolve_resize_fraction(4000, 2000),
            Err(CalibrationError::WouldUpscale {
                requested: 4000,
                actual: 2000
            })
        );
    }
}
