//! Bounds and consistency checks shared by every way settings change.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use tpfan_hw::FanLevel;

use super::profile::TriggerTable;
use super::{SensorId, SettingsError};

/// Highest trigger temperature in °C.
pub const MAX_TEMP: i32 = 100;

/// Highest fan level a trigger may request.
pub const MAX_LEVEL: u16 = FanLevel::MAX;

/// Inclusive hysteresis bounds in °C.
pub const HYSTERESIS_LIMITS: (i32, i32) = (0, 10);

/// Checks a profile's sensor tables against each other and their bounds.
///
/// Names and triggers must cover the same sensors. Path sensors must exist
/// and carry a finite scaling factor. Names must not be blank, tables must
/// not be empty, temperatures lie in `[0, MAX_TEMP]` and levels in
/// `[0, MAX_LEVEL]`.
pub fn check_sensors_and_triggers(
    triggers: &BTreeMap<SensorId, TriggerTable>,
    names: &BTreeMap<SensorId, String>,
    scalings: &BTreeMap<SensorId, f64>,
) -> Result<(), SettingsError> {
    if let Some(sensor) = triggers.keys().find(|s| !names.contains_key(*s)) {
        return Err(SettingsError::invalid(format!(
            "sensor {} has trigger points but no name",
            sensor
        )));
    }
    if let Some(sensor) = names.keys().find(|s| !triggers.contains_key(*s)) {
        return Err(SettingsError::invalid(format!(
            "sensor {} has a name but no trigger points",
            sensor
        )));
    }

    for (sensor, table) in triggers {
        if let SensorId::Path(path) = sensor {
            if !tpfan_hw::hwmon::input_exists(path) {
                return Err(SettingsError::invalid(format!(
                    "sensor {} doesn't exist",
                    sensor
                )));
            }
            match scalings.get(sensor) {
                None => {
                    return Err(SettingsError::invalid(format!(
                        "sensor {} has no scaling factor",
                        sensor
                    )))
                }
                Some(scale) if !scale.is_finite() => {
                    return Err(SettingsError::invalid(format!(
                        "scaling factor of sensor {} is not a number",
                        sensor
                    )))
                }
                Some(_) => {}
            }
        }

        if names[sensor].trim().is_empty() {
            return Err(SettingsError::invalid(format!(
                "name of sensor {} is empty",
                sensor
            )));
        }
        if table.is_empty() {
            return Err(SettingsError::invalid(format!(
                "sensor {} has no trigger points",
                sensor
            )));
        }
        for (&temp, &level) in table {
            if !(0..=MAX_TEMP).contains(&temp) {
                return Err(SettingsError::invalid(format!(
                    "temperature {} of sensor {} is out of bounds (0-{})",
                    temp, sensor, MAX_TEMP
                )));
            }
            if level > MAX_LEVEL {
                return Err(SettingsError::invalid(format!(
                    "fan level {} of sensor {} is out of bounds (0-{})",
                    level, sensor, MAX_LEVEL
                )));
            }
        }
    }
    Ok(())
}

/// Converts one raw trigger point, rejecting values that do not fit.
///
/// Range checks beyond the integer types are left to
/// [`check_sensors_and_triggers`].
pub fn trigger_point(
    sensor: &SensorId,
    temp: i64,
    level: i64,
) -> Result<(i32, u16), SettingsError> {
    let temp = i32::try_from(temp).map_err(|_| {
        SettingsError::invalid(format!(
            "temperature {} of sensor {} is out of bounds (0-{})",
            temp, sensor, MAX_TEMP
        ))
    })?;
    let level = u16::try_from(level).map_err(|_| {
        SettingsError::invalid(format!(
            "fan level {} of sensor {} is out of bounds (0-{})",
            level, sensor, MAX_LEVEL
        ))
    })?;
    Ok((temp, level))
}

/// Parses a hysteresis value and checks [`HYSTERESIS_LIMITS`].
pub fn check_hysteresis(value: i64) -> Result<i32, SettingsError> {
    let (min, max) = HYSTERESIS_LIMITS;
    match i32::try_from(value) {
        Ok(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(SettingsError::invalid(format!(
            "hysteresis {} is out of bounds ({}-{})",
            value, min, max
        ))),
    }
}

/// Checks that a profile name is a plain file name.
pub fn check_profile_name(name: &str) -> Result<(), SettingsError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(SettingsError::invalid(format!(
            "'{}' is not a valid profile name",
            name
        )));
    }
    Ok(())
}

/// Returns the inclusive limits of a numeric setting.
pub fn setting_limits(name: &str) -> Result<(i32, i32), SettingsError> {
    match name {
        "hysteresis" => Ok(HYSTERESIS_LIMITS),
        _ => Err(SettingsError::invalid(format!(
            "setting '{}' has no limits",
            name
        ))),
    }
}

/// A setting that can be changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingKey {
    CurrentProfile,
    Enabled,
    OverrideProfile,
    Hysteresis,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::CurrentProfile => "current_profile",
            SettingKey::Enabled => "enabled",
            SettingKey::OverrideProfile => "override_profile",
            SettingKey::Hysteresis => "hysteresis",
        }
    }

    /// Profile-scoped settings may only change in override mode.
    pub fn requires_override(self) -> bool {
        matches!(self, SettingKey::CurrentProfile | SettingKey::Hysteresis)
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, SettingsError> {
        match s {
            "current_profile" => Ok(SettingKey::CurrentProfile),
            "enabled" => Ok(SettingKey::Enabled),
            "override_profile" => Ok(SettingKey::OverrideProfile),
            "hysteresis" => Ok(SettingKey::Hysteresis),
            _ => Err(SettingsError::invalid(format!("unknown setting '{}'", s))),
        }
    }
}

/// A parsed and range-checked setting change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingUpdate {
    CurrentProfile(String),
    Enabled(bool),
    OverrideProfile(bool),
    Hysteresis(i32),
}

impl SettingUpdate {
    pub fn parse(key: SettingKey, value: &str) -> Result<Self, SettingsError> {
        let value = value.trim();
        match key {
            SettingKey::CurrentProfile => {
                check_profile_name(value)?;
                Ok(SettingUpdate::CurrentProfile(value.to_string()))
            }
            SettingKey::Enabled => parse_bool(key, value).map(SettingUpdate::Enabled),
            SettingKey::OverrideProfile => {
                parse_bool(key, value).map(SettingUpdate::OverrideProfile)
            }
            SettingKey::Hysteresis => {
                let v = value.parse::<i64>().map_err(|_| {
                    SettingsError::invalid(format!("hysteresis '{}' is not an integer", value))
                })?;
                check_hysteresis(v).map(SettingUpdate::Hysteresis)
            }
        }
    }

    pub fn key(&self) -> SettingKey {
        match self {
            SettingUpdate::CurrentProfile(_) => SettingKey::CurrentProfile,
            SettingUpdate::Enabled(_) => SettingKey::Enabled,
            SettingUpdate::OverrideProfile(_) => SettingKey::OverrideProfile,
            SettingUpdate::Hysteresis(_) => SettingKey::Hysteresis,
        }
    }
}

/// Parses a name/value map into updates ordered by key.
///
/// Fails on the first unknown key or bad value; nothing is applied here.
pub fn parse_updates(
    values: &HashMap<String, String>,
) -> Result<Vec<SettingUpdate>, SettingsError> {
    let mut updates = values
        .iter()
        .map(|(key, value)| SettingUpdate::parse(key.parse()?, value))
        .collect::<Result<Vec<_>, _>>()?;
    updates.sort_by_key(SettingUpdate::key);
    Ok(updates)
}

fn parse_bool(key: SettingKey, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(SettingsError::invalid(format!(
            "{} must be true or false, got '{}'",
            key.as_str(),
            value
        ))),
    }
}
