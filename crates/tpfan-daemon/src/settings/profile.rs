//! Fan profiles and their file format.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tpfan_hw::{FanLevel, ModelInfo};

use super::validation::{self, check_hysteresis};
use super::{SensorId, SettingsError};

/// Temperature threshold (°C) to requested fan level, ascending by threshold.
pub type TriggerTable = BTreeMap<i32, u16>;

/// Hysteresis used when a profile does not set one.
pub const DEFAULT_HYSTERESIS: i32 = 2;

const PROFILE_HEADER: &str = "# Fan profile for tpfand\n\n";

/// A fan profile: sensor names, trigger tables and hysteresis.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub comment: String,
    pub product_vendor: String,
    pub product_name: String,
    pub product_id: String,
    pub hysteresis: i32,
    pub sensor_names: BTreeMap<SensorId, String>,
    pub trigger_points: BTreeMap<SensorId, TriggerTable>,
    /// Scaling factors of path sensors.
    pub sensor_scalings: BTreeMap<SensorId, f64>,
}

impl Profile {
    /// The profile written when no user profile exists yet.
    ///
    /// Sensor 0 requests automatic mode at any temperature, which leaves the
    /// fan to the firmware until the profile is edited.
    pub fn standard(model: &ModelInfo) -> Self {
        let sensor = SensorId::Indexed(0);
        let mut profile = Self::empty(model);
        profile.comment = "Default profile".to_string();
        profile
            .sensor_names
            .insert(sensor.clone(), "Sensor 0".to_string());
        profile
            .trigger_points
            .insert(sensor, TriggerTable::from([(0, FanLevel::AUTO.value())]));
        profile
    }

    /// A profile without sensors.
    pub fn empty(model: &ModelInfo) -> Self {
        Self {
            comment: String::new(),
            product_vendor: model.vendor.clone(),
            product_name: model.name.clone(),
            product_id: model.id.clone(),
            hysteresis: DEFAULT_HYSTERESIS,
            sensor_names: BTreeMap::new(),
            trigger_points: BTreeMap::new(),
            sensor_scalings: BTreeMap::new(),
        }
    }

    /// Runs every consistency and bounds check.
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_hysteresis(i64::from(self.hysteresis))?;
        validation::check_sensors_and_triggers(
            &self.trigger_points,
            &self.sensor_names,
            &self.sensor_scalings,
        )
    }

    /// Reads and converts a profile file without validating it.
    pub fn read(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ProfileFile = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    /// Writes the profile, replacing the file.
    pub fn write(&self, path: &Path) -> Result<(), SettingsError> {
        let content = self.to_toml()?;
        write_file(path, &content)
    }

    /// Renders the profile file.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        let body = toml::to_string(&self.to_file())?;
        Ok(format!("{}{}", PROFILE_HEADER, body))
    }

    fn from_file(file: ProfileFile) -> Result<Self, SettingsError> {
        let mut sensor_names = BTreeMap::new();
        let mut trigger_points = BTreeMap::new();
        let mut sensor_scalings = BTreeMap::new();

        for (key, entry) in file.sensors {
            let sensor = SensorId::from_profile_key(&key)?;
            let mut table = TriggerTable::new();
            for (temp, level) in entry.triggers.0 {
                let temp = temp.trim().parse::<i64>().map_err(|_| {
                    SettingsError::invalid(format!(
                        "temperature '{}' of sensor {} is not an integer",
                        temp, sensor
                    ))
                })?;
                let (temp, level) = validation::trigger_point(&sensor, temp, level)?;
                if table.insert(temp, level).is_some() {
                    return Err(SettingsError::invalid(format!(
                        "temperature {} of sensor {} is listed twice",
                        temp, sensor
                    )));
                }
            }
            if let (true, Some(scale)) = (sensor.is_path(), entry.scaling) {
                sensor_scalings.insert(sensor.clone(), scale);
            }
            sensor_names.insert(sensor.clone(), entry.name);
            trigger_points.insert(sensor, table);
        }

        Ok(Self {
            comment: file.general.comment,
            product_vendor: file.general.product_vendor,
            product_name: file.general.product_name,
            product_id: file.general.product_id,
            hysteresis: check_hysteresis(file.options.hysteresis)?,
            sensor_names,
            trigger_points,
            sensor_scalings,
        })
    }

    fn to_file(&self) -> ProfileFile {
        let sensors = self
            .trigger_points
            .iter()
            .map(|(sensor, table)| {
                let entry = SensorEntry {
                    name: self.sensor_names.get(sensor).cloned().unwrap_or_default(),
                    scaling: self.sensor_scalings.get(sensor).copied(),
                    triggers: TriggerEntries(
                        table
                            .iter()
                            .map(|(&temp, &level)| (temp.to_string(), i64::from(level)))
                            .collect(),
                    ),
                };
                (sensor.profile_key(), entry)
            })
            .collect();

        ProfileFile {
            general: ProfileGeneral {
                comment: self.comment.clone(),
                product_vendor: self.product_vendor.clone(),
                product_name: self.product_name.clone(),
                product_id: self.product_id.clone(),
            },
            options: ProfileOptions {
                hysteresis: i64::from(self.hysteresis),
            },
            sensors,
        }
    }
}

/// Writes `content` to `path`, mapping errors.
pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), SettingsError> {
    let write_error = |source| SettingsError::Write {
        path: PathBuf::from(path),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, content).map_err(write_error)
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(rename = "General", default)]
    general: ProfileGeneral,
    #[serde(rename = "Options", default)]
    options: ProfileOptions,
    #[serde(rename = "Sensors", default)]
    sensors: BTreeMap<String, SensorEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileGeneral {
    #[serde(default)]
    comment: String,
    #[serde(default)]
    product_vendor: String,
    #[serde(default)]
    product_name: String,
    #[serde(default)]
    product_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileOptions {
    #[serde(default = "default_hysteresis")]
    hysteresis: i64,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            hysteresis: default_hysteresis(),
        }
    }
}

fn default_hysteresis() -> i64 {
    i64::from(DEFAULT_HYSTERESIS)
}

#[derive(Debug, Serialize, Deserialize)]
struct SensorEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scaling: Option<f64>,
    triggers: TriggerEntries,
}

/// Trigger points keyed by temperature string, kept in numeric order.
///
/// TOML table keys are strings, so thresholds are converted on both ends.
#[derive(Debug, Default)]
struct TriggerEntries(Vec<(String, i64)>);

impl Serialize for TriggerEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (temp, level) in &self.0 {
            map.serialize_entry(temp, level)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TriggerEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, i64>::deserialize(deserializer)?;
        Ok(TriggerEntries(map.into_iter().collect()))
    }
}
