//! Sensor addressing.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::SettingsError;

/// Profile key prefix of thinkpad_acpi thermal sensors.
const INDEXED_KEY_PREFIX: &str = "ibm_thermal_sensor_";

/// Identity of a temperature sensor.
///
/// Indexed sensors are positions in the thinkpad_acpi thermal array. Path
/// sensors are hwmon input files and need a scaling factor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorId {
    Indexed(u32),
    Path(PathBuf),
}

impl SensorId {
    /// Parses a `[Sensors]` key of a profile file.
    pub fn from_profile_key(key: &str) -> Result<Self, SettingsError> {
        if let Some(index) = key.strip_prefix(INDEXED_KEY_PREFIX) {
            return index
                .parse()
                .map(SensorId::Indexed)
                .map_err(|_| SettingsError::invalid(format!("bad sensor index in '{}'", key)));
        }
        if key.starts_with('/') {
            return Ok(SensorId::Path(PathBuf::from(key)));
        }
        Err(SettingsError::invalid(format!("unknown sensor key '{}'", key)))
    }

    /// Returns the `[Sensors]` key used in profile files.
    pub fn profile_key(&self) -> String {
        match self {
            SensorId::Indexed(index) => format!("{}{}", INDEXED_KEY_PREFIX, index),
            SensorId::Path(path) => path.display().to_string(),
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, SensorId::Path(_))
    }
}

impl FromStr for SensorId {
    type Err = SettingsError;

    /// Accepts a thermal array index (`"3"`) or an absolute hwmon path.
    fn from_str(s: &str) -> Result<Self, SettingsError> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(SensorId::Indexed)
                .map_err(|_| SettingsError::invalid(format!("sensor index {} is too large", s)));
        }
        if s.starts_with('/') {
            return Ok(SensorId::Path(PathBuf::from(s)));
        }
        Err(SettingsError::invalid(format!(
            "sensor '{}' is neither an index nor an absolute path",
            s
        )))
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorId::Indexed(index) => write!(f, "{}", index),
            SensorId::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Where the control loop reads a sensor from.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSource {
    Indexed(u32),
    Path { path: PathBuf, scale: f64 },
}
