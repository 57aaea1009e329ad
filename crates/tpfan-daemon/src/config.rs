//! Daemon configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tpfan_hw::{WATCHDOG_MAX_SECS, WATCHDOG_MIN_SECS};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control loop poll interval in milliseconds
    #[serde(default = "default_poll_time")]
    pub poll_time: u64,

    /// Kernel fan watchdog timeout in seconds (1-120)
    #[serde(default = "default_watchdog_time")]
    pub watchdog_time: u32,

    /// Profile used until the settings file selects another one
    #[serde(default = "default_current_profile")]
    pub current_profile: String,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// D-Bus configuration
    #[serde(default)]
    pub dbus: DbusConfig,
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Settings file; user profiles live next to it
    #[serde(default = "default_settings_path")]
    pub settings: PathBuf,

    /// Directory of profiles shipped for known models
    #[serde(default = "default_supplied_profiles")]
    pub supplied_profiles: PathBuf,

    /// thinkpad_acpi fan control file
    #[serde(default = "default_fan_path")]
    pub fan: PathBuf,

    /// thinkpad_acpi thermal file
    #[serde(default = "default_thermal_path")]
    pub thermal: PathBuf,

    /// DMI identity directory
    #[serde(default = "default_dmi_path")]
    pub dmi: PathBuf,

    /// Pid file marking a running daemon
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            settings: default_settings_path(),
            supplied_profiles: default_supplied_profiles(),
            fan: default_fan_path(),
            thermal: default_thermal_path(),
            dmi: default_dmi_path(),
            pid_file: default_pid_file(),
        }
    }
}

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DbusBusType {
    /// Session bus (for development).
    Session,
    /// System bus.
    #[default]
    System,
    /// Try system bus first, fall back to session bus.
    Auto,
}

/// D-Bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbusConfig {
    /// Which bus to register on
    #[serde(default)]
    pub bus: DbusBusType,
}

// Default value functions
fn default_poll_time() -> u64 {
    3500
}

fn default_watchdog_time() -> u32 {
    5
}

fn default_current_profile() -> String {
    "profile_standard".to_string()
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("/etc/tpfan/settings.conf")
}

fn default_supplied_profiles() -> PathBuf {
    PathBuf::from("/usr/share/tpfan/profiles")
}

fn default_fan_path() -> PathBuf {
    PathBuf::from(tpfan_hw::ACPI_FAN_PATH)
}

fn default_thermal_path() -> PathBuf {
    PathBuf::from(tpfan_hw::ACPI_THERMAL_PATH)
}

fn default_dmi_path() -> PathBuf {
    PathBuf::from(tpfan_hw::DMI_ID_DIR)
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/run/tpfand.pid")
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration, using defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.poll_time == 0 {
            anyhow::bail!("poll_time must be at least 1 ms");
        }
        if !(WATCHDOG_MIN_SECS..=WATCHDOG_MAX_SECS).contains(&self.watchdog_time) {
            anyhow::bail!(
                "watchdog_time must be {}-{} seconds, got {}",
                WATCHDOG_MIN_SECS,
                WATCHDOG_MAX_SECS,
                self.watchdog_time
            );
        }
        Ok(())
    }

    /// Directory holding user profiles.
    pub fn profile_dir(&self) -> PathBuf {
        self.paths
            .settings
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_time: default_poll_time(),
            watchdog_time: default_watchdog_time(),
            current_profile: default_current_profile(),
            paths: PathsConfig::default(),
            dbus: DbusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.poll_time, 3500);
        assert_eq!(config.watchdog_time, 5);
        assert_eq!(config.paths.fan, PathBuf::from("/proc/acpi/ibm/fan"));
        assert_eq!(config.dbus.bus, DbusBusType::System);
        assert_eq!(config.profile_dir(), PathBuf::from("/etc/tpfan"));
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            "poll_time = 1000\n[paths]\nsettings = \"/tmp/tpfan/settings.conf\"\n[dbus]\nbus = \"session\"\n",
        )
        .unwrap();
        assert_eq!(config.poll_time, 1000);
        assert_eq!(config.profile_dir(), PathBuf::from("/tmp/tpfan"));
        assert_eq!(config.paths.thermal, PathBuf::from("/proc/acpi/ibm/thermal"));
        assert_eq!(config.dbus.bus, DbusBusType::Session);
    }

    #[test]
    fn test_validate_watchdog_range() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.watchdog_time = 0;
        assert!(config.validate().is_err());
        config.watchdog_time = 121;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.current_profile, "profile_standard");
    }
}
