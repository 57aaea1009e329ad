//! tpfan Hardware Library
//!
//! Provides access to the cooling hardware of ThinkPad notebooks: the
//! thinkpad_acpi fan and thermal files, hwmon temperature inputs, and the
//! DMI strings used to pick a fan profile for the machine.

pub mod dmi;
pub mod error;
pub mod fan;
pub mod hwmon;
pub mod thermal;

pub use dmi::ModelInfo;
pub use error::{Error, Result};
pub use fan::{AcpiFan, FanCommand, FanInterface, FanLevel, FanState};
pub use thermal::{is_disconnected, AcpiThermal};

/// Default thinkpad_acpi fan control file.
pub const ACPI_FAN_PATH: &str = "/proc/acpi/ibm/fan";
/// Default thinkpad_acpi thermal file.
pub const ACPI_THERMAL_PATH: &str = "/proc/acpi/ibm/thermal";
/// Default DMI identity directory.
pub const DMI_ID_DIR: &str = "/sys/class/dmi/id";

/// Watchdog range accepted by thinkpad_acpi, in seconds.
pub const WATCHDOG_MIN_SECS: u32 = 1;
pub const WATCHDOG_MAX_SECS: u32 = 120;
