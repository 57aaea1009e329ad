//! Temperature readings from the thinkpad_acpi thermal file.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Readings of `+128`, `-128` or `0` mark a disconnected sensor.
pub fn is_disconnected(temperature: i32) -> bool {
    matches!(temperature.abs(), 0 | 128)
}

/// Parses a thermal line such as `temperatures:\t52 45 -128 0 30`.
///
/// The first token is a label and is discarded.
pub fn parse_thermal_line(line: &str) -> Result<Vec<i32>> {
    let mut tokens = line.split_whitespace();
    if tokens.next().is_none() {
        return Err(Error::ThermalFormat("empty thermal line".to_string()));
    }
    tokens
        .map(|t| {
            t.parse::<i32>()
                .map_err(|_| Error::ThermalFormat(format!("not a temperature: '{}'", t)))
        })
        .collect()
}

/// The `/proc/acpi/ibm/thermal` interface.
#[derive(Debug, Clone)]
pub struct AcpiThermal {
    path: PathBuf,
}

impl AcpiThermal {
    /// Creates a reader for the given thermal file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the thermal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all temperatures, indexed by sensor number.
    pub fn read(&self) -> Result<Vec<i32>> {
        let content = fs::read_to_string(&self.path).map_err(|e| Error::read(&self.path, e))?;
        let line = content.lines().next().unwrap_or_default();
        parse_thermal_line(line)
    }

    /// Returns the indices of sensors that currently report a temperature.
    pub fn connected_sensors(&self) -> Result<Vec<u32>> {
        Ok(self
            .read()?
            .into_iter()
            .enumerate()
            .filter(|(_, t)| !is_disconnected(*t))
            .map(|(i, _)| i as u32)
            .collect())
    }
}
