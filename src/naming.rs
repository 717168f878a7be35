//! File naming on both sides of the export.
//!
//! ## Input
//!
//! Reconstructions are written by NRecon (or InstaRecon) as zero-padded,
//! monotonically numbered files, so lexicographic order is depth order:
//!
//! ```text
//! SampleA/rec/
//! ├── SampleA_rec.log
//! ├── SampleA_rec00000000.png
//! ├── SampleA_rec00000001.png
//! └── ...
//! ```
//!
//! ## Output
//!
//! STEPanizer wants plain sequential numbering without leading zeros. The
//! prefix is derived once from the whole stack:
//!
//! - `SampleA_rec00000000.png` … → `SampleA`
//! - `SampleA_IR_rec0000.png` … → `SampleA` (InstaRecon marker removed)
//!
//! giving `SampleA_1.jpg`, `SampleA_2.jpg`, …

use crate::config::InputSettings;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix token NRecon appends before the slice number.
const RECONSTRUCTION_TOKEN: &str = "rec";
/// Suffix token InstaRecon adds in front of the reconstruction token.
const INSTARECON_TOKEN: &str = "IR";

/// List the slices of a reconstruction folder, sorted by file name.
///
/// A slice is a regular file whose name contains `slice_marker` and whose
/// extension matches `extension` (case-insensitive).
pub fn collect_slices(rec_dir: &Path, input: &InputSettings) -> std::io::Result<Vec<PathBuf>> {
    let mut slices: Vec<PathBuf> = fs::read_dir(rec_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| is_slice(p, input))
        .collect();
    slices.sort();
    Ok(slices)
}

fn is_slice(path: &Path, input: &InputSettings) -> bool {
    let ext_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(&input.extension));
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(&input.slice_marker));
    ext_matches && name_matches
}

/// Longest common leading substring of all names.
fn longest_common_prefix<'a>(names: &[&'a str]) -> &'a str {
    let Some(first) = names.first() else {
        return "";
    };
    let mut len = first.len();
    for name in &names[1..] {
        len = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, c), _)| i + c.len_utf8())
            .unwrap_or(0)
            .min(len);
    }
    &first[..len]
}

fn strip_token<'a>(name: &'a str, token: &str) -> &'a str {
    match name.strip_suffix(token) {
        Some(rest) => rest.trim_end_matches('_'),
        None => name,
    }
}

/// Derive the output prefix from the file names of the whole stack.
///
/// Takes the common prefix, drops trailing zeros, then the reconstruction
/// token and the optional InstaRecon token (each with its underscores).
/// Returns an empty string when nothing is left.
pub fn common_prefix<S: AsRef<str>>(names: &[S]) -> String {
    let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    let prefix = longest_common_prefix(&names).trim_end_matches('0');
    let prefix = strip_token(prefix.trim_end_matches('_'), RECONSTRUCTION_TOKEN);
    let prefix = strip_token(prefix, INSTARECON_TOKEN);
    prefix.to_string()
}

/// Output prefix for a stack of slice paths, falling back to `fallback` when
/// the file names share no usable prefix.
///
/// Works on file stems so a single-slice stack still loses its extension.
pub fn output_prefix(slices: &[PathBuf], fallback: &str) -> String {
    let names: Vec<String> = slices
        .iter()
        .filter_map(|p| p.file_stem())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    let prefix = common_prefix(&names);
    if prefix.is_empty() {
        fallback.to_string()
    } else {
        prefix
    }
}

/// `{prefix}_{sequence_index}.jpg`, numbered without leading zeros.
pub fn output_file_name(prefix: &str, sequence_index: usize) -> String {
    format!("{prefix}_{sequence_index}.jpg")
}

/// Parameters that end up in the output folder name.
#[derive(Debug, Clone, Copy)]
pub struct FolderParams<'a> {
    pub folder_prefix: &'a str,
    pub mode_tag: &'a str,
    pub pixel_size_um: f64,
    pub scalebar_um: Option<u32>,
    pub resize_px: Option<u32>,
}

/// Output folder name summarizing the run parameters, e.g.
/// `STEPanizer_n15_pixelsize11um_scalebar1000um`.
pub fn output_folder_name(params: &FolderParams<'_>) -> String {
    let mut name = format!(
        "{}_{}_pixelsize{:.0}um",
        params.folder_prefix, params.mode_tag, params.pixel_size_um
    );
    if let Some(um) = params.scalebar_um {
        name.push_str(&format!("_scalebar{um}um"));
    }
    if let Some(px) = params.resize_px {
        name.push_str(&format!("_resize{px}px"));
    }
    name
}
