//! Fan control loop.

mod trips;

pub use trips::{Trip, TripState};

use std::time::Duration;
use tpfan_hw::{hwmon, AcpiThermal, FanInterface, FanLevel, FanState};
use tracing::{debug, info, warn};

use crate::settings::{SensorId, SensorSource, Settings};

/// Clamps a poll interval so the watchdog is always refreshed in time.
pub fn repoll_interval(requested_ms: u64, watchdog_secs: u32) -> Duration {
    let max = u64::from(watchdog_secs) * 1000;
    Duration::from_millis(requested_ms.clamp(1, max.max(1)))
}

/// Drives the fan from temperature readings and the active profile.
pub struct Controller {
    fan: Box<dyn FanInterface>,
    thermal: Option<AcpiThermal>,
    trips: TripState,
    seen_generation: u64,
    read_failures: u32,
}

impl Controller {
    /// Creates a controller. Without a thermal file only path sensors are read.
    pub fn new(fan: Box<dyn FanInterface>, thermal: Option<AcpiThermal>) -> Self {
        Self {
            fan,
            thermal,
            trips: TripState::new(),
            seen_generation: 0,
            read_failures: 0,
        }
    }

    /// Runs one control cycle and returns the delay until the next one.
    pub fn poll(&mut self, settings: &Settings) -> Duration {
        if settings.generation() != self.seen_generation {
            if !self.trips.is_empty() {
                debug!("Settings reloaded, clearing trip points");
            }
            self.trips.clear();
            self.seen_generation = settings.generation();
        }

        let level = self.decide(settings);
        self.apply(level, settings.watchdog_time());
        repoll_interval(settings.poll_time(), settings.watchdog_time())
    }

    fn decide(&mut self, settings: &Settings) -> FanLevel {
        if !settings.enabled() {
            return FanLevel::AUTO;
        }
        if settings.trigger_points().is_empty() {
            debug!("No active profile, leaving fan to the firmware");
            return FanLevel::AUTO;
        }

        let readings = match self.read_sensors(settings) {
            Ok(readings) => {
                if self.read_failures > 0 {
                    info!(
                        "Temperature readings recovered after {} failed cycles",
                        self.read_failures
                    );
                    self.read_failures = 0;
                }
                readings
            }
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures == 1 {
                    warn!("Failed to read temperatures, fan set to auto: {}", e);
                } else {
                    debug!("Temperature read failed again: {}", e);
                }
                return FanLevel::AUTO;
            }
        };

        let level = self.trips.evaluate(
            &readings,
            settings.trigger_points(),
            settings.hysteresis(),
        );
        debug!("Readings {:?} -> level {}", readings, level);
        FanLevel::saturating(level)
    }

    fn apply(&mut self, level: FanLevel, watchdog_secs: u32) {
        match self.fan.set_level(level, watchdog_secs) {
            Ok(true) => info!("Fan level set to {}", level),
            Ok(false) => {}
            // Seen around suspend and resume; the next cycle retries.
            Err(e) => warn!("Failed to set fan level {}: {}", level, e),
        }
    }

    /// Reads every sensor the active profile uses.
    pub fn read_sensors(&self, settings: &Settings) -> tpfan_hw::Result<Vec<(SensorId, i32)>> {
        let mut readings = Vec::new();
        if let Some(thermal) = &self.thermal {
            for (index, temperature) in thermal.read()?.into_iter().enumerate() {
                readings.push((SensorId::Indexed(index as u32), temperature));
            }
        }
        for source in settings.sensor_sources() {
            if let SensorSource::Path { path, scale } = source {
                let temperature = hwmon::read_scaled(&path, scale)?;
                readings.push((SensorId::Path(path), temperature));
            }
        }
        Ok(readings)
    }

    /// Raw thinkpad_acpi temperatures, or `None` without a thermal file.
    pub fn temperatures(&self) -> Option<tpfan_hw::Result<Vec<i32>>> {
        self.thermal.as_ref().map(AcpiThermal::read)
    }

    /// Indices of thinkpad_acpi sensors that report a temperature.
    pub fn connected_sensors(&self) -> Option<tpfan_hw::Result<Vec<u32>>> {
        self.thermal.as_ref().map(AcpiThermal::connected_sensors)
    }

    pub fn fan_state(&mut self) -> tpfan_hw::Result<FanState> {
        self.fan.state()
    }

    pub fn trips(&self) -> &TripState {
        &self.trips
    }

    pub fn reset_trips(&mut self) {
        self.trips.clear();
        info!("Trip points reset");
    }

    /// Hands the fan back to the firmware.
    pub fn release(&mut self, watchdog_secs: u32) {
        match self.fan.set_level(FanLevel::AUTO, watchdog_secs) {
            Ok(_) => info!("Fan returned to automatic mode"),
            Err(e) => warn!("Failed to return fan to automatic mode: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingUpdate, SettingsPaths, TriggerTable};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tpfan_hw::fan::LevelSetting;
    use tpfan_hw::{FanCommand, ModelInfo};

    /// Fan that applies commands to a shared state so tests can inspect it.
    struct SharedFan {
        state: Arc<Mutex<FanState>>,
        commands: Arc<Mutex<Vec<String>>>,
        fail_writes: bool,
    }

    impl FanInterface for SharedFan {
        fn state(&mut self) -> tpfan_hw::Result<FanState> {
            Ok(*self.state.lock().unwrap())
        }

        fn send(&mut self, command: FanCommand) -> tpfan_hw::Result<()> {
            if self.fail_writes {
                return Err(tpfan_hw::Error::FanStateFormat("suspended".to_string()));
            }
            let level = match command {
                FanCommand::Disable => Some(FanLevel::OFF),
                FanCommand::Level(LevelSetting::Manual(n)) => FanLevel::new(u16::from(n) + 1).ok(),
                FanCommand::Level(LevelSetting::Disengaged) => Some(FanLevel::DISENGAGED),
                FanCommand::Level(LevelSetting::Auto) => Some(FanLevel::AUTO),
                FanCommand::Level(LevelSetting::FullSpeed) => Some(FanLevel::FULL_SPEED),
                _ => None,
            };
            if let Some(level) = level {
                self.state.lock().unwrap().level = level;
            }
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }

    struct Rig {
        dir: TempDir,
        state: Arc<Mutex<FanState>>,
        commands: Arc<Mutex<Vec<String>>>,
        controller: Controller,
        settings: Settings,
    }

    impl Rig {
        fn new(fail_writes: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let thermal = dir.path().join("thermal");
            fs::write(&thermal, "temperatures:\t40 -128 0 0 0 0 0 0\n").unwrap();

            let state = Arc::new(Mutex::new(FanState {
                level: FanLevel::AUTO,
                rpm: 0,
            }));
            let commands = Arc::new(Mutex::new(Vec::new()));
            let fan = SharedFan {
                state: state.clone(),
                commands: commands.clone(),
                fail_writes,
            };
            let controller = Controller::new(Box::new(fan), Some(AcpiThermal::new(thermal)));

            let paths = SettingsPaths {
                settings: dir.path().join("settings.conf"),
                profile_dir: dir.path().to_path_buf(),
                supplied_profiles: dir.path().join("profiles"),
            };
            let mut settings =
                Settings::with_paths(paths, ModelInfo::default(), "profile_standard", 2000, 5);
            settings.load().unwrap();

            Self {
                dir,
                state,
                commands,
                controller,
                settings,
            }
        }

        fn enable_with_triggers(&mut self, table: TriggerTable) {
            self.settings
                .set_settings(&[
                    SettingUpdate::Enabled(true),
                    SettingUpdate::OverrideProfile(true),
                    SettingUpdate::Hysteresis(3),
                ])
                .unwrap();
            self.settings
                .add_sensor(SensorId::Indexed(0), "CPU".to_string(), table, None)
                .unwrap();
        }

        fn set_temperature(&self, temperature: i32) {
            fs::write(
                self.dir.path().join("thermal"),
                format!("temperatures:\t{} -128 0 0 0 0 0 0\n", temperature),
            )
            .unwrap();
        }

        fn level(&self) -> FanLevel {
            self.state.lock().unwrap().level
        }
    }

    #[test]
    fn test_repoll_interval_clamped() {
        assert_eq!(repoll_interval(0, 5), Duration::from_millis(1));
        assert_eq!(repoll_interval(3500, 5), Duration::from_millis(3500));
        assert_eq!(repoll_interval(60_000, 5), Duration::from_millis(5000));
    }

    #[test]
    fn test_disabled_forces_auto() {
        let mut rig = Rig::new(false);
        *rig.state.lock().unwrap() = FanState {
            level: FanLevel::new(3).unwrap(),
            rpm: 2000,
        };
        let next = rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::AUTO);
        assert_eq!(next, Duration::from_millis(2000));

        rig.controller.poll(&rig.settings);
        let commands = rig.commands.lock().unwrap();
        assert_eq!(commands.last().map(String::as_str), Some("watchdog 5"));
    }

    #[test]
    fn test_triggers_drive_fan() {
        let mut rig = Rig::new(false);
        rig.enable_with_triggers(TriggerTable::from([(50, 2), (70, 5)]));

        rig.set_temperature(55);
        rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::new(2).unwrap());

        rig.set_temperature(48);
        rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::new(2).unwrap());

        rig.set_temperature(40);
        rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::OFF);
    }

    #[test]
    fn test_reload_clears_trips() {
        let mut rig = Rig::new(false);
        rig.enable_with_triggers(TriggerTable::from([(50, 2)]));
        rig.set_temperature(55);
        rig.controller.poll(&rig.settings);
        assert!(!rig.controller.trips().is_empty());

        rig.settings.load().unwrap();
        rig.set_temperature(20);
        rig.controller.poll(&rig.settings);
        assert!(rig.controller.trips().is_empty());
        assert_eq!(rig.level(), FanLevel::OFF);
    }

    #[test]
    fn test_read_failure_forces_auto() {
        let mut rig = Rig::new(false);
        rig.enable_with_triggers(TriggerTable::from([(50, 2)]));
        rig.set_temperature(55);
        rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::new(2).unwrap());

        fs::write(rig.dir.path().join("thermal"), "garbage here\n").unwrap();
        rig.controller.poll(&rig.settings);
        assert_eq!(rig.level(), FanLevel::AUTO);
        assert!(rig.controller.trips().get(&SensorId::Indexed(0)).is_some());
    }

    #[test]
    fn test_write_failure_keeps_trips() {
        let mut rig = Rig::new(true);
        rig.enable_with_triggers(TriggerTable::from([(50, 2)]));
        rig.set_temperature(55);
        rig.controller.poll(&rig.settings);
        assert_eq!(
            rig.controller.trips().get(&SensorId::Indexed(0)),
            Some(&Trip {
                temperature: 47,
                level: 2
            })
        );
    }

    #[test]
    fn test_reset_trips() {
        let mut rig = Rig::new(false);
        rig.enable_with_triggers(TriggerTable::from([(50, 2)]));
        rig.set_temperature(55);
        rig.controller.poll(&rig.settings);
        rig.controller.reset_trips();
        assert!(rig.controller.trips().is_empty());
    }
}
