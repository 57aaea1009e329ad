//! Error types for the tpfan hardware library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a kernel interface file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a command to a kernel interface file failed.
    #[error("failed to write '{command}' to {path}: {source}")]
    Write {
        path: PathBuf,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The thermal file did not contain a parsable reading.
    #[error("malformed thermal reading: {0}")]
    ThermalFormat(String),

    /// The fan file did not report a level and speed.
    #[error("malformed fan state: {0}")]
    FanStateFormat(String),

    /// An hwmon input file did not contain an integer.
    #[error("malformed hwmon reading in {path}: {value:?}")]
    HwmonFormat { path: PathBuf, value: String },

    /// Fan level outside 0-256.
    #[error("invalid fan level: {0} (must be 0-256)")]
    InvalidLevel(i64),
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }
}
