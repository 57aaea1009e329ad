//! Errors returned over D-Bus.

use zbus::DBusError;

use crate::settings::SettingsError;

/// D-Bus errors, named `org.tpfan.Error.<Variant>` on the bus.
#[derive(DBusError, Debug)]
#[zbus(prefix = "org.tpfan.Error")]
pub enum DaemonError {
    #[zbus(error)]
    ZBus(zbus::Error),
    /// A value was malformed or out of bounds.
    Validation(String),
    /// A profile-scoped value was changed outside override mode.
    ProfileNotOverridden(String),
    /// Hardware could not be read.
    Unavailable(String),
    /// A settings or profile file could not be read or written.
    Persistence(String),
}

impl From<SettingsError> for DaemonError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Validation(message) => DaemonError::Validation(message),
            e @ SettingsError::ProfileNotOverridden => {
                DaemonError::ProfileNotOverridden(e.to_string())
            }
            e => DaemonError::Persistence(e.to_string()),
        }
    }
}

impl From<tpfan_hw::Error> for DaemonError {
    fn from(e: tpfan_hw::Error) -> Self {
        DaemonError::Unavailable(e.to_string())
    }
}
