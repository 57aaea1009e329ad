//! Temperature inputs from hwmon sysfs files.

use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Reads an hwmon input file and applies a scaling factor.
///
/// hwmon reports millidegrees, so profiles usually carry a scale of 0.001.
/// The scaled value is rounded to whole degrees.
pub fn read_scaled(path: &Path, scale: f64) -> Result<i32> {
    let content = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw: i64 = content.trim().parse().map_err(|_| Error::HwmonFormat {
        path: path.to_path_buf(),
        value: content.trim().to_string(),
    })?;
    Ok((raw as f64 * scale).round() as i32)
}

/// Returns true if `path` names an existing regular file.
pub fn input_exists(path: &Path) -> bool {
    path.is_file()
}
