//! Console and run-log line formatting.
//!
//! Every line the operator sees, on screen or in `STEPanizerizer.log`, is
//! built here. Format functions are pure (no I/O, no clock) and return
//! `String`s; the exporter decides where each line goes.
//!
//! # Run Log Layout
//!
//! ```text
//! STEPanizerizer (version v0.3.0) has been run with this command line
//! --
//! stepanizerizer -f SampleA -n 10
//! --
//! Conversion started at 14:02:11 on 19.10.2026
//! --------------------------------------------------------------------------------
//! Approximately 10 images are written from /data/SampleA/rec to /data/SampleA/STEPanizer_n10_...
//! The scale bar at the bottom right of the images corresponds to 1000 um.
//! We use systematic uniform random sampling, so the start and end slice will be different each time the tool is run!
//! --------------------------------------------------------------------------------
//! 1/10: SampleA_rec00000004.png --> SampleA_1.jpg
//! ...
//! --------------------------------------------------------------------------------
//! Conversion finished at 14:02:19 on 19.10.2026
//! ```

use crate::sampling::{SamplingMode, SamplingPlan};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

/// One exported slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    /// 1-based position in the exported series.
    pub sequence_index: usize,
    pub source_name: String,
    pub output_name: String,
}

/// Separator line between log sections.
pub fn separator() -> String {
    "-".repeat(80)
}

/// `HH:MM:SS on DD.MM.YYYY`
pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    time.format("%H:%M:%S on %d.%m.%Y").to_string()
}

/// Banner opening every run log.
pub fn format_banner(version: &str, command_line: &str) -> Vec<String> {
    vec![
        format!("STEPanizerizer (version {version}) has been run with this command line"),
        "--".to_string(),
        command_line.to_string(),
        "--".to_string(),
    ]
}

pub fn format_started(timestamp: &str) -> String {
    format!("Conversion started at {timestamp}")
}

pub fn format_finished(timestamp: &str) -> String {
    format!("Conversion finished at {timestamp}")
}

pub fn format_aborted(timestamp: &str, reason: &str) -> String {
    format!("Conversion aborted at {timestamp}: {reason}")
}

/// Console line with the pixel size used for calibration.
pub fn format_pixel_size(pixel_size_um: f64) -> String {
    format!("The scan was done with a voxel size of {pixel_size_um:.2} um.")
}

pub fn format_found(rec_dir: &Path, count: usize) -> Vec<String> {
    vec![
        format!("Looking for slices in {}", rec_dir.display()),
        format!("We found {count} reconstructions."),
    ]
}

/// How the stack is sampled, for the console.
pub fn format_selection(mode: &SamplingMode, plan: &SamplingPlan, output_dir: &Path) -> String {
    let how = match mode {
        SamplingMode::ByCount(n) => format!("{n} images"),
        SamplingMode::ByDistance(d) => format!("images {d} um apart"),
    };
    format!(
        "We will select {} from these (every {}. slice, starting at slice {}) and write {} images to {}",
        how,
        plan.step_width,
        plan.start_offset,
        plan.selected_count(),
        output_dir.display()
    )
}

/// Log line naming input and output folders.
pub fn format_transfer(count: usize, rec_dir: &Path, output_dir: &Path) -> String {
    format!(
        "Approximately {} images are written from {} to {}",
        count,
        rec_dir.display(),
        output_dir.display()
    )
}

/// Console line with the scale-bar length on the written images.
pub fn format_scalebar_pixels(scalebar_um: u32, scalebar_px: u32, resize: Option<f64>) -> String {
    let effective = scalebar_px as f64 * resize.unwrap_or(1.0);
    format!("A scale bar of {scalebar_um} um will thus be about {effective:.0} px long.")
}

pub fn format_scalebar_log(scalebar_um: u32) -> String {
    format!("The scale bar at the bottom right of the images corresponds to {scalebar_um} um.")
}

/// Log line describing the resize.
pub fn format_resize(longest_side: u32, fraction: f64) -> String {
    format!(
        "The longest side of the image is being resized from {} px to {:.2}% of it: {:.0} px",
        longest_side,
        100.0 * fraction,
        longest_side as f64 * fraction
    )
}

pub fn sampling_notice() -> String {
    "We use systematic uniform random sampling, so the start and end slice will be different each time the tool is run!".to_string()
}

/// `seq/total: source --> output`, shared by console and run log.
pub fn format_record(record: &OutputRecord, total: usize) -> String {
    format!(
        "{}/{}: {} --> {}",
        record.sequence_index, total, record.source_name, record.output_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn separator_is_80_dashes() {
        assert_eq!(separator().len(), 80);
        assert!(separator().chars().all(|c| c == '-'));
    }

    #[test]
    fn timestamp_format() {
        let time = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_timestamp(&time), "09:05:01 on 07.03.2026");
    }

    #[test]
    fn banner_lines() {
        let banner = format_banner("v0.3.0", "stepanizerizer -f A -n 10");
        assert_eq!(
            banner,
            vec![
                "STEPanizerizer (version v0.3.0) has been run with this command line",
                "--",
                "stepanizerizer -f A -n 10",
                "--",
            ]
        );
    }

    #[test]
    fn record_line() {
        let record = OutputRecord {
            sequence_index: 3,
            source_name: "A_rec0024.png".to_string(),
            output_name: "A_3.jpg".to_string(),
        };
        assert_eq!(format_record(&record, 10), "3/10: A_rec0024.png --> A_3.jpg");
    }

    #[test]
    fn pixel_size_two_decimals() {
        assert_eq!(
            format_pixel_size(11.0),
            "The scan was done with a voxel size of 11.00 um."
        );
    }

    #[test]
    fn scalebar_pixels_without_resize() {
        assert_eq!(
            format_scalebar_pixels(1000, 91, None),
            "A scale bar of 1000 um will thus be about 91 px long."
        );
    }

    #[test]
    fn scalebar_pixels_after_resize() {
        assert_eq!(
            format_scalebar_pixels(1000, 100, Some(0.5)),
            "A scale bar of 1000 um will thus be about 50 px long."
        );
    }

    #[test]
    fn resize_line() {
        assert_eq!(
            format_resize(2000, 0.8),
            "The longest side of the image is being resized from 2000 px to 80.00% of it: 1600 px"
        );
    }

    #[test]
    fn selection_line_by_count() {
        let plan = SamplingPlan {
            total_count: 100,
            step_width: 10,
            start_offset: 4,
        };
        let line = format_selection(&SamplingMode::ByCount(10), &plan, Path::new("/out"));
        assert_eq!(
            line,
            "We will select 10 images from these (every 10. slice, starting at slice 4) and write 10 images to /out"
        );
    }

    #[test]
    fn selection_line_by_distance() {
        let plan = SamplingPlan {
            total_count: 100,
            step_width: 9,
            start_offset: 0,
        };
        let line = format_selection(&SamplingMode::ByDistance(100.0), &plan, Path::new("/out"));
        assert!(line.starts_with("We will select images 100 um apart from these"));
        assert!(line.contains("write 12 images"));
    }

    #[test]
    fn aborted_line_carries_reason() {
        assert_eq!(
            format_aborted("10:00:00 on 01.01.2026", "cancelled"),
            "Conversion aborted at 10:00:00 on 01.01.2026: cancelled"
        );
    }
}
