//! Fan control through the thinkpad_acpi fan file.

use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::level::{FanCommand, FanLevel, FanState};

/// A fan that reports its state and accepts line commands.
pub trait FanInterface: Send {
    /// Reads the current fan level and speed.
    fn state(&mut self) -> Result<FanState>;

    /// Writes one command.
    fn send(&mut self, command: FanCommand) -> Result<()>;

    /// Requests a fan level and refreshes the watchdog.
    ///
    /// The current level is read back first. If it already matches, only the
    /// watchdog is re-armed. Otherwise the fan is enabled (or disabled for
    /// level 0), the watchdog re-armed and the level command written.
    /// Returns whether the level was changed.
    fn set_level(&mut self, level: FanLevel, watchdog_secs: u32) -> Result<bool> {
        let current = match self.state() {
            Ok(state) => Some(state.level),
            Err(e) => {
                debug!("Fan read-back failed, writing full sequence: {}", e);
                None
            }
        };

        if current == Some(level) {
            self.send(FanCommand::Watchdog(watchdog_secs))?;
            return Ok(false);
        }

        if level == FanLevel::OFF {
            self.send(FanCommand::Disable)?;
        } else {
            self.send(FanCommand::Enable)?;
        }
        self.send(FanCommand::Watchdog(watchdog_secs))?;
        if let Some(command) = level.level_command() {
            self.send(command)?;
        }
        debug!("Fan level {:?} -> {}", current, level);
        Ok(true)
    }
}

/// The `/proc/acpi/ibm/fan` interface.
pub struct AcpiFan {
    path: PathBuf,
}

impl AcpiFan {
    /// Creates a fan controller for the given control file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the control file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks that the kernel accepts level and watchdog commands.
    ///
    /// Leaves the fan in automatic mode.
    pub fn probe(&mut self, watchdog_secs: u32) -> Result<()> {
        self.send(FanCommand::Level(super::LevelSetting::Auto))?;
        self.send(FanCommand::Watchdog(watchdog_secs))?;
        Ok(())
    }
}

impl FanInterface for AcpiFan {
    fn state(&mut self) -> Result<FanState> {
        let content = fs::read_to_string(&self.path).map_err(|e| Error::read(&self.path, e))?;
        FanState::parse(&content)
    }

    fn send(&mut self, command: FanCommand) -> Result<()> {
        let line = command.to_string();
        let write_error = |source| Error::Write {
            path: self.path.clone(),
            command: line.clone(),
            source,
        };

        // One command per write; the kernel parses each write separately.
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(write_error)?;
        file.write_all(line.as_bytes()).map_err(write_error)?;
        file.flush().map_err(write_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::LevelSetting;

    /// In-memory fan that applies commands to its state and records them.
    struct RecordingFan {
        state: FanState,
        commands: Vec<FanCommand>,
        fail_reads: bool,
    }

    impl RecordingFan {
        fn new(level: FanLevel) -> Self {
            Self {
                state: FanState { level, rpm: 0 },
                commands: Vec::new(),
                fail_reads: false,
            }
        }

        fn lines(&self) -> Vec<String> {
            self.commands.iter().map(|c| c.to_string()).collect()
        }
    }

    impl FanInterface for RecordingFan {
        fn state(&mut self) -> Result<FanState> {
            if self.fail_reads {
                return Err(Error::FanStateFormat("unreadable".to_string()));
            }
            Ok(self.state)
        }

        fn send(&mut self, command: FanCommand) -> Result<()> {
            match command {
                FanCommand::Disable => self.state.level = FanLevel::OFF,
                FanCommand::Level(LevelSetting::Manual(n)) => {
                    self.state.level = FanLevel::new(u16::from(n) + 1).unwrap()
                }
                FanCommand::Level(LevelSetting::Auto) => self.state.level = FanLevel::AUTO,
                FanCommand::Level(LevelSetting::Disengaged) => {
                    self.state.level = FanLevel::DISENGAGED
                }
                FanCommand::Level(LevelSetting::FullSpeed) => {
                    self.state.level = FanLevel::FULL_SPEED
                }
                FanCommand::Enable | FanCommand::Watchdog(_) => {}
            }
            self.commands.push(command);
            Ok(())
        }
    }

    #[test]
    fn test_set_level_sequence() {
        let mut fan = RecordingFan::new(FanLevel::AUTO);
        assert!(fan.set_level(FanLevel::new(3).unwrap(), 5).unwrap());
        assert_eq!(fan.lines(), vec!["enable", "watchdog 5", "level 2"]);
    }

    #[test]
    fn test_set_level_off_disables() {
        let mut fan = RecordingFan::new(FanLevel::AUTO);
        fan.set_level(FanLevel::OFF, 5).unwrap();
        assert_eq!(fan.lines(), vec!["disable", "watchdog 5"]);
    }

    #[test]
    fn test_same_level_only_refreshes_watchdog() {
        let mut fan = RecordingFan::new(FanLevel::AUTO);
        let level = FanLevel::new(4).unwrap();

        assert!(fan.set_level(level, 5).unwrap());
        assert!(!fan.set_level(level, 5).unwrap());

        let lines = fan.lines();
        assert_eq!(lines.iter().filter(|l| *l == "watchdog 5").count(), 2);
        assert_eq!(lines.iter().filter(|l| l.starts_with("level")).count(), 1);
    }

    #[test]
    fn test_unreadable_state_writes_full_sequence() {
        let mut fan = RecordingFan::new(FanLevel::AUTO);
        fan.fail_reads = true;
        fan.set_level(FanLevel::AUTO, 3).unwrap();
        assert_eq!(fan.lines(), vec!["enable", "watchdog 3", "level auto"]);
    }

    #[test]
    fn test_acpi_fan_reads_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fan");
        std::fs::write(&path, "status:\tenabled\nspeed:\t3100\nlevel:\t4\n").unwrap();

        let mut fan = AcpiFan::new(&path);
        let state = fan.state().unwrap();
        assert_eq!(state.level.value(), 5);
        assert_eq!(state.rpm, 3100);
    }

    #[test]
    fn test_acpi_fan_writes_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fan");
        std::fs::write(&path, "").unwrap();

        let mut fan = AcpiFan::new(&path);
        fan.send(FanCommand::Watchdog(5)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "watchdog 5");
    }

    #[test]
    fn test_acpi_fan_missing_file() {
        let mut fan = AcpiFan::new("/nonexistent/tpfan/fan");
        assert!(fan.state().is_err());
        assert!(fan.send(FanCommand::Enable).is_err());
    }
}
