//! Fan levels and the thinkpad_acpi command vocabulary.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Abstract fan level as used by profiles and the control loop.
///
/// `0` turns the fan off, `1..=253` select hardware level `n - 1`, and the
/// top three values select the special firmware modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FanLevel(u16);

impl FanLevel {
    /// Fan disabled.
    pub const OFF: FanLevel = FanLevel(0);
    /// Fan running unregulated ("disengaged").
    pub const DISENGAGED: FanLevel = FanLevel(254);
    /// Embedded controller decides the speed.
    pub const AUTO: FanLevel = FanLevel(255);
    /// Maximum regulated speed.
    pub const FULL_SPEED: FanLevel = FanLevel(256);

    /// Highest accepted level value.
    pub const MAX: u16 = 256;

    /// Creates a level, rejecting values above [`FanLevel::MAX`].
    pub fn new(value: u16) -> Result<Self> {
        if value > Self::MAX {
            return Err(Error::InvalidLevel(value.into()));
        }
        Ok(FanLevel(value))
    }

    /// Creates a level, clamping values above [`FanLevel::MAX`] to full speed.
    pub fn saturating(value: u16) -> Self {
        FanLevel(value.min(Self::MAX))
    }

    /// Returns the numeric level.
    pub fn value(self) -> u16 {
        self.0
    }

    /// Returns the `level ...` command that selects this level, or `None`
    /// for [`FanLevel::OFF`], which is expressed by `disable` alone.
    pub fn level_command(self) -> Option<FanCommand> {
        let setting = match self.0 {
            0 => return None,
            254 => LevelSetting::Disengaged,
            255 => LevelSetting::Auto,
            256 => LevelSetting::FullSpeed,
            // 1..=253 by construction, so n - 1 fits in a byte
            n => LevelSetting::Manual((n - 1) as u8),
        };
        Some(FanCommand::Level(setting))
    }

    /// Parses the value of the `level:` line reported by the fan file.
    pub fn from_reported(value: &str) -> Result<Self> {
        match value.trim() {
            "0" => Ok(FanLevel::OFF),
            "auto" => Ok(FanLevel::AUTO),
            "disengaged" => Ok(FanLevel::DISENGAGED),
            "full-speed" => Ok(FanLevel::FULL_SPEED),
            other => other
                .parse::<u16>()
                .ok()
                .and_then(|n| n.checked_add(1))
                .filter(|n| *n <= 253)
                .map(FanLevel)
                .ok_or_else(|| Error::FanStateFormat(format!("unknown level '{}'", other))),
        }
    }
}

impl TryFrom<i64> for FanLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u16::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(FanLevel)
            .ok_or(Error::InvalidLevel(value))
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FanLevel::OFF => write!(f, "off"),
            FanLevel::DISENGAGED => write!(f, "disengaged"),
            FanLevel::AUTO => write!(f, "auto"),
            FanLevel::FULL_SPEED => write!(f, "full-speed"),
            FanLevel(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for FanLevel {
    type Err = Error;

    /// Accepts a number or one of `off`, `disengaged`, `auto`, `full-speed`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(FanLevel::OFF),
            "disengaged" => Ok(FanLevel::DISENGAGED),
            "auto" => Ok(FanLevel::AUTO),
            "full-speed" | "full_speed" => Ok(FanLevel::FULL_SPEED),
            other => {
                let n: i64 = other
                    .parse()
                    .map_err(|_| Error::FanStateFormat(format!("unknown level '{}'", s)))?;
                FanLevel::try_from(n)
            }
        }
    }
}

/// Argument of a `level` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSetting {
    /// Hardware level 0-252.
    Manual(u8),
    Disengaged,
    Auto,
    FullSpeed,
}

/// One line command accepted by the fan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanCommand {
    Enable,
    Disable,
    /// Re-arm the kernel watchdog for this many seconds.
    Watchdog(u32),
    Level(LevelSetting),
}

impl fmt::Display for FanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanCommand::Enable => write!(f, "enable"),
            FanCommand::Disable => write!(f, "disable"),
            FanCommand::Watchdog(secs) => write!(f, "watchdog {}", secs),
            FanCommand::Level(LevelSetting::Manual(n)) => write!(f, "level {}", n),
            FanCommand::Level(LevelSetting::Disengaged) => write!(f, "level disengaged"),
            FanCommand::Level(LevelSetting::Auto) => write!(f, "level auto"),
            FanCommand::Level(LevelSetting::FullSpeed) => write!(f, "level full-speed"),
        }
    }
}

/// Fan state as reported by the fan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanState {
    pub level: FanLevel,
    pub rpm: u32,
}

impl FanState {
    /// Parses the `key: value` lines of the fan file.
    ///
    /// The `level:` line is required; a missing `speed:` line reads as 0 rpm.
    pub fn parse(content: &str) -> Result<Self> {
        let mut level = None;
        let mut rpm = 0;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "level" => level = Some(FanLevel::from_reported(value)?),
                "speed" => {
                    rpm = value.trim().parse().map_err(|_| {
                        Error::FanStateFormat(format!("bad speed '{}'", value.trim()))
                    })?
                }
                _ => {}
            }
        }

        let level = level.ok_or_else(|| Error::FanStateFormat("no level line".to_string()))?;
        Ok(FanState { level, rpm })
    }
}
