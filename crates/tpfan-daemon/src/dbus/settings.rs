//! The `org.tpfan.Settings1` interface.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use zbus::interface;

use super::DaemonError;
use crate::settings::validation::{self, parse_updates};
use crate::settings::{SensorId, SettingsError, TriggerTable};
use crate::state::AppState;

/// Settings and profile access.
pub struct Settings1Interface {
    state: Arc<AppState>,
}

impl Settings1Interface {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[interface(name = "org.tpfan.Settings1")]
impl Settings1Interface {
    /// Returns vendor, name, id, profile_name and profile_id of the machine.
    fn get_model_info(&self) -> HashMap<String, String> {
        let settings = self.state.settings();
        let model = settings.model_info();
        HashMap::from([
            ("vendor".to_string(), model.vendor.clone()),
            ("name".to_string(), model.name.clone()),
            ("id".to_string(), model.id.clone()),
            ("profile_name".to_string(), model.profile_name.clone()),
            ("profile_id".to_string(), model.profile_id.clone()),
        ])
    }

    fn get_loaded_profiles(&self) -> Vec<String> {
        self.state.settings().loaded_profiles().to_vec()
    }

    fn get_profile_comment(&self) -> String {
        self.state.settings().profile_comment().to_string()
    }

    fn is_profile_exactly_matched(&self) -> bool {
        self.state.settings().is_profile_exactly_matched()
    }

    /// Reloads settings and profile from disk.
    fn load(&self) -> Result<(), DaemonError> {
        self.state.settings().load()?;
        info!("D-Bus: Load");
        Ok(())
    }

    /// Writes settings and, while overriding, the profile.
    fn save(&self) -> Result<(), DaemonError> {
        self.state.settings().save()?;
        info!("D-Bus: Save");
        Ok(())
    }

    fn get_sensor_names(&self) -> HashMap<String, String> {
        self.state
            .settings()
            .sensor_names()
            .iter()
            .map(|(sensor, name)| (sensor.to_string(), name.clone()))
            .collect()
    }

    fn set_sensor_names(&self, names: HashMap<String, String>) -> Result<(), DaemonError> {
        let names = parse_sensor_names(names)?;
        self.state.settings().set_sensor_names(names)?;
        debug!("D-Bus: SetSensorNames");
        Ok(())
    }

    fn get_trigger_points(&self) -> HashMap<String, HashMap<i32, i32>> {
        self.state
            .settings()
            .trigger_points()
            .iter()
            .map(|(sensor, table)| {
                let table = table
                    .iter()
                    .map(|(&temp, &level)| (temp, i32::from(level)))
                    .collect();
                (sensor.to_string(), table)
            })
            .collect()
    }

    fn set_trigger_points(
        &self,
        triggers: HashMap<String, HashMap<i32, i32>>,
    ) -> Result<(), DaemonError> {
        let triggers = parse_trigger_points(triggers)?;
        self.state.settings().set_trigger_points(triggers)?;
        debug!("D-Bus: SetTriggerPoints");
        Ok(())
    }

    /// Returns all global settings as strings.
    fn get_settings(&self) -> HashMap<String, String> {
        let settings = self.state.settings();
        HashMap::from([
            ("enabled".to_string(), settings.enabled().to_string()),
            (
                "override_profile".to_string(),
                settings.override_profile().to_string(),
            ),
            (
                "current_profile".to_string(),
                settings.current_profile().to_string(),
            ),
            ("hysteresis".to_string(), settings.hysteresis().to_string()),
            ("poll_time".to_string(), settings.poll_time().to_string()),
            (
                "watchdog_time".to_string(),
                settings.watchdog_time().to_string(),
            ),
        ])
    }

    /// Applies setting changes; nothing changes unless all of them are valid.
    fn set_settings(&self, values: HashMap<String, String>) -> Result<(), DaemonError> {
        let updates = parse_updates(&values)?;
        self.state.settings().set_settings(&updates)?;
        debug!("D-Bus: SetSettings({:?})", updates);
        Ok(())
    }

    /// Returns the active profile in profile file format.
    fn get_profile_string(&self) -> Result<String, DaemonError> {
        Ok(self.state.settings().profile_string()?)
    }

    /// Returns the inclusive limits of a numeric setting.
    fn get_setting_limits(&self, name: &str) -> Result<(i32, i32), DaemonError> {
        Ok(validation::setting_limits(name)?)
    }

    fn get_sensor_count(&self) -> u32 {
        self.state.settings().sensor_count() as u32
    }

    /// Adds or replaces one sensor. `scaling` is ignored for indexed
    /// sensors; pass an empty string for none.
    fn add_sensor(
        &self,
        sensor: &str,
        name: &str,
        triggers: HashMap<i32, i32>,
        scaling: &str,
    ) -> Result<(), DaemonError> {
        let sensor: SensorId = sensor.parse()?;
        let table = parse_trigger_table(&sensor, triggers)?;
        let scaling = match scaling.trim() {
            "" => None,
            s => Some(s.parse::<f64>().map_err(|_| {
                SettingsError::Validation(format!("scaling '{}' is not a number", s))
            })?),
        };
        self.state
            .settings()
            .add_sensor(sensor.clone(), name.to_string(), table, scaling)?;
        info!("D-Bus: AddSensor({})", sensor);
        Ok(())
    }

    /// Indices of thinkpad_acpi sensors that report a temperature.
    fn get_available_thermal_sensors(&self) -> Result<Vec<u32>, DaemonError> {
        match self.state.controller().connected_sensors() {
            Some(sensors) => Ok(sensors?),
            None => Err(DaemonError::Unavailable(
                "thermal file disabled".to_string(),
            )),
        }
    }

    fn check_if_hwmon_sensor_exists(&self, path: &str) -> bool {
        tpfan_hw::hwmon::input_exists(Path::new(path))
    }

    #[zbus(property)]
    fn enabled(&self) -> bool {
        self.state.settings().enabled()
    }

    #[zbus(property)]
    fn override_profile(&self) -> bool {
        self.state.settings().override_profile()
    }
}

fn parse_sensor_names(
    names: HashMap<String, String>,
) -> Result<BTreeMap<SensorId, String>, SettingsError> {
    names
        .into_iter()
        .map(|(sensor, name)| Ok((sensor.parse()?, name)))
        .collect()
}

fn parse_trigger_points(
    triggers: HashMap<String, HashMap<i32, i32>>,
) -> Result<BTreeMap<SensorId, TriggerTable>, SettingsError> {
    triggers
        .into_iter()
        .map(|(sensor, table)| {
            let sensor: SensorId = sensor.parse()?;
            let table = parse_trigger_table(&sensor, table)?;
            Ok((sensor, table))
        })
        .collect()
}

fn parse_trigger_table(
    sensor: &SensorId,
    table: HashMap<i32, i32>,
) -> Result<TriggerTable, SettingsError> {
    table
        .into_iter()
        .map(|(temp, level)| validation::trigger_point(sensor, temp.into(), level.into()))
        .collect()
}
