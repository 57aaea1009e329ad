//! Settings store: global settings, the active fan profile and their files.
//!
//! Every mutation works on a candidate copy of the active state. The
//! candidate is validated, written to disk and then read back with
//! [`Settings::load`], so the live state always matches the files. A
//! failed read-back restores the files the mutation wrote.

mod error;
mod profile;
mod sensor;
pub mod validation;

pub use error::SettingsError;
pub use profile::{Profile, TriggerTable, DEFAULT_HYSTERESIS};
pub use sensor::{SensorId, SensorSource};
pub use validation::{SettingKey, SettingUpdate};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tpfan_hw::ModelInfo;
use tracing::{debug, info, warn};

use crate::config::Config;
use profile::write_file;
use validation::check_profile_name;

const SETTINGS_HEADER: &str = "# tpfand settings\n\n";

/// File locations used by the store.
#[derive(Debug, Clone)]
pub struct SettingsPaths {
    /// Settings file.
    pub settings: PathBuf,
    /// Directory of user profiles.
    pub profile_dir: PathBuf,
    /// Directory of profiles shipped for known models.
    pub supplied_profiles: PathBuf,
}

impl SettingsPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settings: config.paths.settings.clone(),
            profile_dir: config.profile_dir(),
            supplied_profiles: config.paths.supplied_profiles.clone(),
        }
    }
}

/// State produced by one successful load.
#[derive(Debug, Clone)]
struct Active {
    enabled: bool,
    override_profile: bool,
    current_profile: String,
    profile: Option<Profile>,
    profile_matched: bool,
    loaded_profiles: Vec<String>,
}

impl Active {
    fn initial(current_profile: &str) -> Self {
        Self {
            enabled: false,
            override_profile: false,
            current_profile: current_profile.to_string(),
            profile: None,
            profile_matched: false,
            loaded_profiles: Vec::new(),
        }
    }
}

/// Settings and the active profile.
pub struct Settings {
    paths: SettingsPaths,
    model: ModelInfo,
    default_profile: String,
    poll_time: u64,
    watchdog_time: u32,
    active: Active,
    generation: u64,
    empty_names: BTreeMap<SensorId, String>,
    empty_triggers: BTreeMap<SensorId, TriggerTable>,
}

impl Settings {
    /// Creates a store in the disabled state. Call [`Settings::load`] next.
    pub fn new(config: &Config, model: ModelInfo) -> Self {
        Self::with_paths(
            SettingsPaths::from_config(config),
            model,
            &config.current_profile,
            config.poll_time,
            config.watchdog_time,
        )
    }

    pub fn with_paths(
        paths: SettingsPaths,
        model: ModelInfo,
        default_profile: &str,
        poll_time: u64,
        watchdog_time: u32,
    ) -> Self {
        Self {
            paths,
            model,
            default_profile: default_profile.to_string(),
            poll_time,
            watchdog_time,
            active: Active::initial(default_profile),
            generation: 0,
            empty_names: BTreeMap::new(),
            empty_triggers: BTreeMap::new(),
        }
    }

    /// Loads settings and the matching profile from disk.
    ///
    /// Missing settings and profile files are created with defaults. On any
    /// error the live state is left as it was.
    pub fn load(&mut self) -> Result<(), SettingsError> {
        if !self.paths.settings.exists() {
            info!(
                "Settings file {} not found, writing defaults",
                self.paths.settings.display()
            );
            self.write_settings(&Active::initial(&self.default_profile))?;
        }

        let file = SettingsFile::read(&self.paths.settings)?;
        let current_profile = file
            .general
            .current_profile
            .unwrap_or_else(|| self.default_profile.clone());
        check_profile_name(&current_profile)?;

        let user_path = self.paths.profile_dir.join(&current_profile);
        if !user_path.exists() {
            info!("Profile {} not found, writing defaults", user_path.display());
            Profile::standard(&self.model).write(&user_path)?;
        }

        let matched = self.profile_match();
        let (profile, loaded_profiles) = if file.general.override_profile {
            (Some(Profile::read(&user_path)?), vec![current_profile.clone()])
        } else if let Some(path) = &matched {
            (
                Some(Profile::read(path)?),
                vec![self.model.profile_id.clone()],
            )
        } else {
            (None, Vec::new())
        };
        if let Some(profile) = &profile {
            profile.validate()?;
        }

        self.active = Active {
            enabled: file.general.enabled,
            override_profile: file.general.override_profile,
            current_profile,
            profile,
            profile_matched: matched.is_some(),
            loaded_profiles,
        };
        self.generation += 1;

        info!(
            "Settings loaded: enabled={}, override_profile={}, profile={:?}",
            self.active.enabled, self.active.override_profile, self.active.loaded_profiles
        );
        Ok(())
    }

    /// Writes the live settings, and the live profile while overriding.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.persist(&self.active, true)
    }

    /// Returns the shipped profile for this machine, if there is one.
    pub fn profile_match(&self) -> Option<PathBuf> {
        if self.model.profile_id.is_empty() {
            return None;
        }
        let path = self.paths.supplied_profiles.join(&self.model.profile_id);
        debug!("Looking for a profile in {}", path.display());
        path.is_file().then_some(path)
    }

    /// Replaces all sensor names.
    pub fn set_sensor_names(
        &mut self,
        names: BTreeMap<SensorId, String>,
    ) -> Result<(), SettingsError> {
        self.require_override()?;
        let mut candidate = self.active.clone();
        self.candidate_profile(&mut candidate)?.sensor_names = names;
        self.commit(candidate, true)
    }

    /// Replaces all trigger tables.
    pub fn set_trigger_points(
        &mut self,
        triggers: BTreeMap<SensorId, TriggerTable>,
    ) -> Result<(), SettingsError> {
        self.require_override()?;
        let mut candidate = self.active.clone();
        let profile = self.candidate_profile(&mut candidate)?;
        profile.trigger_points = triggers;
        // Scaling factors follow their sensors.
        let keep = profile.trigger_points.clone();
        profile.sensor_scalings.retain(|sensor, _| keep.contains_key(sensor));
        self.commit(candidate, true)
    }

    /// Inserts or replaces one sensor with its name, triggers and scaling.
    pub fn add_sensor(
        &mut self,
        sensor: SensorId,
        name: String,
        triggers: TriggerTable,
        scaling: Option<f64>,
    ) -> Result<(), SettingsError> {
        self.require_override()?;
        let mut candidate = self.active.clone();
        let profile = self.candidate_profile(&mut candidate)?;
        match scaling {
            Some(scale) if sensor.is_path() => {
                profile.sensor_scalings.insert(sensor.clone(), scale);
            }
            _ => {
                profile.sensor_scalings.remove(&sensor);
            }
        }
        profile.sensor_names.insert(sensor.clone(), name);
        profile.trigger_points.insert(sensor, triggers);
        self.commit(candidate, true)
    }

    /// Applies parsed setting updates as one transaction.
    ///
    /// Profile-scoped settings are checked against the `override_profile`
    /// value the request leaves behind, so one request may enable override
    /// mode and change the hysteresis.
    pub fn set_settings(&mut self, updates: &[SettingUpdate]) -> Result<(), SettingsError> {
        let override_after = updates
            .iter()
            .rev()
            .find_map(|update| match update {
                SettingUpdate::OverrideProfile(value) => Some(*value),
                _ => None,
            })
            .unwrap_or(self.active.override_profile);

        let mut switches_profile = false;
        let mut sets_hysteresis = false;
        for update in updates {
            if update.key().requires_override() && !override_after {
                return Err(SettingsError::ProfileNotOverridden);
            }
            match update {
                SettingUpdate::CurrentProfile(name) => {
                    let path = self.paths.profile_dir.join(name);
                    if !path.is_file() {
                        return Err(SettingsError::invalid(format!(
                            "profile {} doesn't exist",
                            name
                        )));
                    }
                    switches_profile = *name != self.active.current_profile;
                }
                SettingUpdate::Hysteresis(_) => sets_hysteresis = true,
                _ => {}
            }
        }
        if switches_profile && sets_hysteresis {
            return Err(SettingsError::invalid(
                "hysteresis can't be changed while switching current_profile",
            ));
        }

        let mut candidate = self.active.clone();
        for update in updates {
            match update {
                SettingUpdate::CurrentProfile(name) => candidate.current_profile = name.clone(),
                SettingUpdate::Enabled(value) => candidate.enabled = *value,
                SettingUpdate::OverrideProfile(value) => candidate.override_profile = *value,
                SettingUpdate::Hysteresis(value) => {
                    self.candidate_profile(&mut candidate)?.hysteresis = *value
                }
            }
        }
        // The profile the reload will select is checked before anything is written.
        if candidate.override_profile && (switches_profile || candidate.profile.is_none()) {
            candidate.profile = Some(self.user_profile(&candidate.current_profile)?);
        }
        self.commit(candidate, !switches_profile)
    }

    /// Renders the active profile in profile file format.
    pub fn profile_string(&self) -> Result<String, SettingsError> {
        match &self.active.profile {
            Some(profile) => profile.to_toml(),
            None => Profile::empty(&self.model).to_toml(),
        }
    }

    /// Counter bumped by every successful load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn enabled(&self) -> bool {
        self.active.enabled
    }

    pub fn override_profile(&self) -> bool {
        self.active.override_profile
    }

    pub fn current_profile(&self) -> &str {
        &self.active.current_profile
    }

    pub fn hysteresis(&self) -> i32 {
        self.active
            .profile
            .as_ref()
            .map_or(DEFAULT_HYSTERESIS, |p| p.hysteresis)
    }

    pub fn poll_time(&self) -> u64 {
        self.poll_time
    }

    pub fn watchdog_time(&self) -> u32 {
        self.watchdog_time
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model
    }

    pub fn loaded_profiles(&self) -> &[String] {
        &self.active.loaded_profiles
    }

    /// Comment of the shipped profile; empty while overriding.
    pub fn profile_comment(&self) -> &str {
        match (&self.active.profile, self.active.override_profile) {
            (Some(profile), false) => &profile.comment,
            _ => "",
        }
    }

    pub fn is_profile_exactly_matched(&self) -> bool {
        self.active.profile_matched
    }

    pub fn sensor_names(&self) -> &BTreeMap<SensorId, String> {
        self.active
            .profile
            .as_ref()
            .map_or(&self.empty_names, |p| &p.sensor_names)
    }

    pub fn trigger_points(&self) -> &BTreeMap<SensorId, TriggerTable> {
        self.active
            .profile
            .as_ref()
            .map_or(&self.empty_triggers, |p| &p.trigger_points)
    }

    pub fn sensor_count(&self) -> usize {
        self.trigger_points().len()
    }

    /// Where each configured sensor is read from.
    pub fn sensor_sources(&self) -> Vec<SensorSource> {
        let Some(profile) = &self.active.profile else {
            return Vec::new();
        };
        profile
            .trigger_points
            .keys()
            .map(|sensor| match sensor {
                SensorId::Indexed(index) => SensorSource::Indexed(*index),
                SensorId::Path(path) => SensorSource::Path {
                    path: path.clone(),
                    scale: profile.sensor_scalings.get(sensor).copied().unwrap_or(1.0),
                },
            })
            .collect()
    }

    fn require_override(&self) -> Result<(), SettingsError> {
        if self.active.override_profile {
            Ok(())
        } else {
            Err(SettingsError::ProfileNotOverridden)
        }
    }

    /// Profile a candidate edits.
    ///
    /// Without an active profile the user profile file is the starting point,
    /// or an empty profile if that file does not exist.
    fn candidate_profile<'a>(
        &self,
        candidate: &'a mut Active,
    ) -> Result<&'a mut Profile, SettingsError> {
        if candidate.profile.is_none() {
            let path = self.paths.profile_dir.join(&candidate.current_profile);
            let profile = if path.is_file() {
                Profile::read(&path)?
            } else {
                Profile::empty(&self.model)
            };
            candidate.profile = Some(profile);
        }
        Ok(candidate
            .profile
            .get_or_insert_with(|| Profile::empty(&self.model)))
    }

    /// User profile file `name`, or the standard profile [`Settings::load`]
    /// would create for it.
    fn user_profile(&self, name: &str) -> Result<Profile, SettingsError> {
        let path = self.paths.profile_dir.join(name);
        if path.is_file() {
            Profile::read(&path)
        } else {
            Ok(Profile::standard(&self.model))
        }
    }

    fn commit(&mut self, candidate: Active, write_profile: bool) -> Result<(), SettingsError> {
        if let Some(profile) = &candidate.profile {
            profile.validate()?;
        }

        let mut snapshots = vec![FileSnapshot::take(&self.paths.settings)?];
        if write_profile && candidate.override_profile {
            let path = self.paths.profile_dir.join(&candidate.current_profile);
            snapshots.push(FileSnapshot::take(&path)?);
        }

        let result = self
            .persist(&candidate, write_profile)
            .and_then(|()| self.load());
        if let Err(e) = &result {
            warn!("Settings change failed, restoring previous files: {}", e);
            for snapshot in snapshots.iter().rev() {
                snapshot.restore();
            }
        }
        result
    }

    fn persist(&self, active: &Active, write_profile: bool) -> Result<(), SettingsError> {
        self.write_settings(active)?;
        if write_profile && active.override_profile {
            if let Some(profile) = &active.profile {
                let path = self.paths.profile_dir.join(&active.current_profile);
                debug!("Writing profile {}", path.display());
                profile.write(&path)?;
            }
        }
        Ok(())
    }

    fn write_settings(&self, active: &Active) -> Result<(), SettingsError> {
        let file = SettingsFile {
            general: GeneralSection {
                enabled: active.enabled,
                override_profile: active.override_profile,
                current_profile: Some(active.current_profile.clone()),
            },
        };
        file.write(&self.paths.settings)
    }
}

/// Contents of a file before a mutation touched it.
struct FileSnapshot {
    path: PathBuf,
    contents: Option<Vec<u8>>,
}

impl FileSnapshot {
    fn take(path: &Path) -> Result<Self, SettingsError> {
        let contents = match fs::read(path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            contents,
        })
    }

    fn restore(&self) {
        let result = match &self.contents {
            Some(contents) => fs::write(&self.path, contents),
            None => match fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            warn!("Failed to restore {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "General", default)]
    general: GeneralSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeneralSection {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    override_profile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_profile: Option<String>,
}

impl SettingsFile {
    fn read(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path) -> Result<(), SettingsError> {
        let body = toml::to_string(self)?;
        write_file(path, &format!("{}{}", SETTINGS_HEADER, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn model() -> ModelInfo {
        ModelInfo::new("LENOVO", "7664WM7", "ThinkPad T61")
    }

    fn store(dir: &TempDir) -> Settings {
        let paths = SettingsPaths {
            settings: dir.path().join("etc/settings.conf"),
            profile_dir: dir.path().join("etc"),
            supplied_profiles: dir.path().join("profiles"),
        };
        Settings::with_paths(paths, model(), "profile_standard", 3500, 5)
    }

    fn loaded(dir: &TempDir) -> Settings {
        let mut settings = store(dir);
        settings.load().unwrap();
        settings
    }

    fn overriding(dir: &TempDir) -> Settings {
        let mut settings = loaded(dir);
        settings
            .set_settings(&[SettingUpdate::OverrideProfile(true)])
            .unwrap();
        settings
    }

    fn cpu_tables() -> (BTreeMap<SensorId, String>, BTreeMap<SensorId, TriggerTable>) {
        let sensor = SensorId::Indexed(0);
        (
            BTreeMap::from([(sensor.clone(), "CPU".to_string())]),
            BTreeMap::from([(sensor, TriggerTable::from([(50, 2), (70, 5)]))]),
        )
    }

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = loaded(&dir);
        assert!(dir.path().join("etc/settings.conf").is_file());
        assert!(dir.path().join("etc/profile_standard").is_file());
        assert!(!settings.enabled());
        assert!(!settings.override_profile());
        assert_eq!(settings.current_profile(), "profile_standard");
        assert!(settings.trigger_points().is_empty());
        assert!(!settings.is_profile_exactly_matched());
        assert_eq!(settings.generation(), 1);
    }

    #[test]
    fn test_override_loads_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        let settings = overriding(&dir);
        assert_eq!(settings.loaded_profiles(), ["profile_standard"]);
        assert_eq!(
            settings.trigger_points()[&SensorId::Indexed(0)],
            TriggerTable::from([(0, 255)])
        );
        assert_eq!(settings.hysteresis(), DEFAULT_HYSTERESIS);
        assert_eq!(settings.profile_comment(), "");
    }

    #[test]
    fn test_supplied_profile_matched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("profiles")).unwrap();
        fs::write(
            dir.path().join("profiles/lenovo_7664wm7"),
            "[General]\ncomment = \"T61 profile\"\n[Options]\nhysteresis = 4\n\
             [Sensors.ibm_thermal_sensor_0]\nname = \"CPU\"\ntriggers = { \"45\" = 1 }\n",
        )
        .unwrap();

        let settings = loaded(&dir);
        assert!(settings.is_profile_exactly_matched());
        assert_eq!(settings.profile_comment(), "T61 profile");
        assert_eq!(settings.hysteresis(), 4);
        assert_eq!(settings.loaded_profiles(), ["lenovo_7664wm7"]);
    }

    #[test]
    fn test_profile_scoped_changes_need_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = loaded(&dir);
        let before = fs::read_to_string(dir.path().join("etc/settings.conf")).unwrap();

        let (names, triggers) = cpu_tables();
        assert!(matches!(
            settings.set_settings(&[SettingUpdate::Hysteresis(5)]),
            Err(SettingsError::ProfileNotOverridden)
        ));
        assert!(matches!(
            settings.set_settings(&[SettingUpdate::CurrentProfile("profile_standard".into())]),
            Err(SettingsError::ProfileNotOverridden)
        ));
        assert!(matches!(
            settings.set_sensor_names(names),
            Err(SettingsError::ProfileNotOverridden)
        ));
        assert!(matches!(
            settings.set_trigger_points(triggers),
            Err(SettingsError::ProfileNotOverridden)
        ));

        assert_eq!(settings.hysteresis(), DEFAULT_HYSTERESIS);
        assert_eq!(settings.generation(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/settings.conf")).unwrap(),
            before
        );
    }

    #[test]
    fn test_rejected_request_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = loaded(&dir);
        let before = fs::read(dir.path().join("etc/settings.conf")).unwrap();

        assert!(matches!(
            settings.set_settings(&[SettingUpdate::Enabled(true), SettingUpdate::Hysteresis(5)]),
            Err(SettingsError::ProfileNotOverridden)
        ));
        assert!(!settings.enabled());
        assert_eq!(settings.generation(), 1);
        assert_eq!(fs::read(dir.path().join("etc/settings.conf")).unwrap(), before);

        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert!(!reloaded.enabled());
    }

    #[test]
    fn test_switch_to_invalid_profile_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        fs::write(
            dir.path().join("etc/bad"),
            "[Sensors.ibm_thermal_sensor_0]\nname = \"CPU\"\ntriggers = { \"150\" = 2 }\n",
        )
        .unwrap();
        let before = fs::read(dir.path().join("etc/settings.conf")).unwrap();
        let generation = settings.generation();

        let err = settings
            .set_settings(&[SettingUpdate::CurrentProfile("bad".into())])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(settings.current_profile(), "profile_standard");
        assert_eq!(settings.generation(), generation);
        assert_eq!(fs::read(dir.path().join("etc/settings.conf")).unwrap(), before);

        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert_eq!(reloaded.current_profile(), "profile_standard");
    }

    #[test]
    fn test_enable_override_with_invalid_user_profile_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = loaded(&dir);
        fs::write(
            dir.path().join("etc/profile_standard"),
            "[Options]\nhysteresis = 3\n[Sensors.ibm_thermal_sensor_0]\nname = \"\"\n\
             triggers = { \"50\" = 2 }\n",
        )
        .unwrap();
        let before = fs::read(dir.path().join("etc/settings.conf")).unwrap();

        let err = settings
            .set_settings(&[SettingUpdate::OverrideProfile(true)])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert!(!settings.override_profile());
        assert_eq!(fs::read(dir.path().join("etc/settings.conf")).unwrap(), before);
    }

    #[test]
    fn test_failed_reload_restores_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let before = fs::read(dir.path().join("etc/settings.conf")).unwrap();
        let generation = settings.generation();

        // Shipped profile breaks the reload once override is switched off.
        fs::create_dir_all(dir.path().join("profiles")).unwrap();
        fs::write(dir.path().join("profiles/lenovo_7664wm7"), "[Sensors\n").unwrap();

        let err = settings
            .set_settings(&[SettingUpdate::OverrideProfile(false)])
            .unwrap_err();
        assert!(err.is_persistence());
        assert!(settings.override_profile());
        assert_eq!(settings.generation(), generation);
        assert_eq!(fs::read(dir.path().join("etc/settings.conf")).unwrap(), before);
    }

    #[test]
    fn test_override_and_hysteresis_in_one_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = loaded(&dir);
        settings
            .set_settings(&[
                SettingUpdate::OverrideProfile(true),
                SettingUpdate::Hysteresis(6),
            ])
            .unwrap();
        assert!(settings.override_profile());
        assert_eq!(settings.hysteresis(), 6);
    }

    #[test]
    fn test_trigger_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let (names, triggers) = cpu_tables();

        let sensor = SensorId::Indexed(0);
        settings
            .add_sensor(
                sensor.clone(),
                names[&sensor].clone(),
                triggers[&sensor].clone(),
                None,
            )
            .unwrap();
        settings
            .set_settings(&[SettingUpdate::Enabled(true), SettingUpdate::Hysteresis(3)])
            .unwrap();
        settings.save().unwrap();

        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert!(reloaded.enabled());
        assert!(reloaded.override_profile());
        assert_eq!(reloaded.current_profile(), "profile_standard");
        assert_eq!(reloaded.hysteresis(), 3);
        assert_eq!(reloaded.sensor_names(), &names);
        assert_eq!(reloaded.trigger_points(), &triggers);
    }

    #[test]
    fn test_save_load_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        settings.save().unwrap();
        let settings_file = fs::read(dir.path().join("etc/settings.conf")).unwrap();
        let profile_file = fs::read(dir.path().join("etc/profile_standard")).unwrap();

        settings.load().unwrap();
        settings.save().unwrap();
        assert_eq!(fs::read(dir.path().join("etc/settings.conf")).unwrap(), settings_file);
        assert_eq!(fs::read(dir.path().join("etc/profile_standard")).unwrap(), profile_file);
    }

    #[test]
    fn test_mismatched_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let generation = settings.generation();

        let names = BTreeMap::from([(SensorId::Indexed(1), "GPU".to_string())]);
        let err = settings.set_sensor_names(names).unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(settings.generation(), generation);
        assert_eq!(settings.sensor_names()[&SensorId::Indexed(0)], "Sensor 0");
    }

    #[test]
    fn test_out_of_bounds_trigger_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let triggers = BTreeMap::from([(SensorId::Indexed(0), TriggerTable::from([(101, 2)]))]);
        assert!(settings.set_trigger_points(triggers).is_err());
        assert_eq!(
            settings.trigger_points()[&SensorId::Indexed(0)],
            TriggerTable::from([(0, 255)])
        );
    }

    #[test]
    fn test_switch_to_missing_profile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let err = settings
            .set_settings(&[SettingUpdate::CurrentProfile("quiet".into())])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(settings.current_profile(), "profile_standard");
    }

    #[test]
    fn test_switch_profile_keeps_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let quiet = "[Options]\nhysteresis = 1\n\
                     [Sensors.ibm_thermal_sensor_0]\nname = \"CPU\"\ntriggers = { \"60\" = 1 }\n";
        fs::write(dir.path().join("etc/quiet"), quiet).unwrap();

        settings
            .set_settings(&[SettingUpdate::CurrentProfile("quiet".into())])
            .unwrap();
        assert_eq!(settings.current_profile(), "quiet");
        assert_eq!(settings.hysteresis(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("etc/quiet")).unwrap(), quiet);

        assert!(settings
            .set_settings(&[
                SettingUpdate::CurrentProfile("profile_standard".into()),
                SettingUpdate::Hysteresis(4),
            ])
            .is_err());
    }

    #[test]
    fn test_broken_settings_file_keeps_live_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = overriding(&dir);
        let generation = settings.generation();
        fs::write(dir.path().join("etc/settings.conf"), "[General\nenabled = ").unwrap();

        let err = settings.load().unwrap_err();
        assert!(err.is_persistence());
        assert!(settings.override_profile());
        assert_eq!(settings.generation(), generation);
    }

    #[test]
    fn test_path_sensor_sources() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("temp1_input");
        fs::write(&input, "52000\n").unwrap();
        let mut settings = overriding(&dir);

        settings
            .add_sensor(
                SensorId::Path(input.clone()),
                "hwmon".to_string(),
                TriggerTable::from([(55, 3)]),
                Some(0.001),
            )
            .unwrap();
        assert_eq!(settings.sensor_count(), 2);
        assert!(settings.sensor_sources().contains(&SensorSource::Path {
            path: input,
            scale: 0.001
        }));

        let missing_scale = settings.add_sensor(
            SensorId::Path(dir.path().join("temp1_input")),
            "hwmon".to_string(),
            TriggerTable::from([(55, 3)]),
            None,
        );
        assert!(missing_scale.is_err());
    }

    #[test]
    fn test_profile_string() {
        let dir = tempfile::tempdir().unwrap();
        let settings = overriding(&dir);
        let text = settings.profile_string().unwrap();
        assert!(text.contains("ibm_thermal_sensor_0"));
        assert!(text.contains("hysteresis = 2"));
    }
}
