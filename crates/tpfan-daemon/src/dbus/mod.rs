//! D-Bus interfaces of the fan daemon.
//!
//! Provides `org.tpfan.Settings1` and `org.tpfan.Control1` under the bus
//! name `org.tpfan.Daemon`.

mod control;
mod error;
mod server;
mod settings;

pub use control::Control1Interface;
pub use error::DaemonError;
pub use server::{run_dbus_server, BUS_NAME, CONTROL_PATH, SETTINGS_PATH};
pub use settings::Settings1Interface;
