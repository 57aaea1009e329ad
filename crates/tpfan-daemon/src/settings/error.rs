//! Settings errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the settings store.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A setting, sensor or trigger value was rejected.
    #[error("{0}")]
    Validation(String),

    /// A profile-scoped value was changed while `override_profile` is off.
    #[error("profile not overridden: enable override_profile first")]
    ProfileNotOverridden,

    /// A settings or profile file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A settings or profile file is not valid TOML for its format.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A settings or profile file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// In-memory state could not be serialized.
    #[error("failed to serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl SettingsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SettingsError::Validation(message.into())
    }

    /// Returns true for file access and format failures.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            SettingsError::Read { .. }
                | SettingsError::Parse { .. }
                | SettingsError::Write { .. }
                | SettingsError::Serialize(_)
        )
    }
}
