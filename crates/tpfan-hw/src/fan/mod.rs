//! Fan module.
//!
//! Provides control over the thinkpad_acpi fan through its procfs file.

mod device;
mod level;

pub use device::{AcpiFan, FanInterface};
pub use level::{FanCommand, FanLevel, FanState, LevelSetting};
