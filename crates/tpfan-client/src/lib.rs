//! D-Bus client library for communicating with the tpfan daemon.
//!
//! Wraps the `org.tpfan.Settings1` and `org.tpfan.Control1` interfaces for
//! command line and desktop front ends.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;
use zbus::{proxy, Connection};

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "org.tpfan.Daemon";

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default)]
pub enum BusType {
    /// Session bus (user session).
    Session,
    /// System bus (system-wide).
    System,
    /// Try system first, fall back to session.
    #[default]
    Auto,
}

/// Settings and profile access.
#[proxy(
    interface = "org.tpfan.Settings1",
    default_service = "org.tpfan.Daemon",
    default_path = "/org/tpfan/Settings"
)]
trait Settings1 {
    fn get_model_info(&self) -> zbus::Result<HashMap<String, String>>;

    fn get_loaded_profiles(&self) -> zbus::Result<Vec<String>>;

    fn get_profile_comment(&self) -> zbus::Result<String>;

    fn is_profile_exactly_matched(&self) -> zbus::Result<bool>;

    fn load(&self) -> zbus::Result<()>;

    fn save(&self) -> zbus::Result<()>;

    fn get_sensor_names(&self) -> zbus::Result<HashMap<String, String>>;

    fn set_sensor_names(&self, names: HashMap<String, String>) -> zbus::Result<()>;

    fn get_trigger_points(&self) -> zbus::Result<HashMap<String, HashMap<i32, i32>>>;

    fn set_trigger_points(&self, triggers: HashMap<String, HashMap<i32, i32>>)
        -> zbus::Result<()>;

    fn get_settings(&self) -> zbus::Result<HashMap<String, String>>;

    fn set_settings(&self, values: HashMap<String, String>) -> zbus::Result<()>;

    fn get_profile_string(&self) -> zbus::Result<String>;

    fn get_setting_limits(&self, name: &str) -> zbus::Result<(i32, i32)>;

    fn get_sensor_count(&self) -> zbus::Result<u32>;

    fn add_sensor(
        &self,
        sensor: &str,
        name: &str,
        triggers: HashMap<i32, i32>,
        scaling: &str,
    ) -> zbus::Result<()>;

    fn get_available_thermal_sensors(&self) -> zbus::Result<Vec<u32>>;

    fn check_if_hwmon_sensor_exists(&self, path: &str) -> zbus::Result<bool>;

    #[zbus(property)]
    fn enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn override_profile(&self) -> zbus::Result<bool>;
}

/// Live readings and trip state.
#[proxy(
    interface = "org.tpfan.Control1",
    default_service = "org.tpfan.Daemon",
    default_path = "/org/tpfan/Control"
)]
trait Control1 {
    fn get_version(&self) -> zbus::Result<String>;

    fn get_temperatures(&self) -> zbus::Result<Vec<i32>>;

    fn get_fan_state(&self) -> zbus::Result<HashMap<String, i32>>;

    fn reset_trips(&self) -> zbus::Result<()>;

    fn get_trip_temperatures(&self) -> zbus::Result<HashMap<String, i32>>;

    fn get_trip_fan_speeds(&self) -> zbus::Result<HashMap<String, i32>>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// D-Bus client wrapper for the daemon.
pub struct DaemonClient {
    settings: Settings1Proxy<'static>,
    control: Control1Proxy<'static>,
}

impl DaemonClient {
    /// Connects with auto bus detection.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_bus(BusType::Auto).await
    }

    /// Connects to the daemon on the given bus.
    pub async fn connect_with_bus(bus_type: BusType) -> Result<Self> {
        let connection = match bus_type {
            BusType::Session => {
                debug!("Connecting to session bus");
                Connection::session()
                    .await
                    .context("Failed to connect to session bus")?
            }
            BusType::System => {
                debug!("Connecting to system bus");
                Connection::system()
                    .await
                    .context("Failed to connect to system bus")?
            }
            BusType::Auto => {
                // Prefer the system bus, where tpfand normally runs
                if let Ok(conn) = Connection::system().await {
                    debug!("Connected to system bus, checking for daemon service");
                    if Self::service_exists(&conn).await {
                        debug!("Found daemon on system bus");
                        conn
                    } else {
                        debug!("Daemon not on system bus, trying session bus");
                        let session = Connection::session()
                            .await
                            .context("Failed to connect to session bus")?;
                        if Self::service_exists(&session).await {
                            debug!("Found daemon on session bus");
                            session
                        } else {
                            anyhow::bail!(
                                "Daemon service not found on system or session bus. Is tpfand running?"
                            )
                        }
                    }
                } else {
                    debug!("System bus unavailable, trying session bus");
                    Connection::session()
                        .await
                        .context("Failed to connect to any D-Bus")?
                }
            }
        };

        let settings = Settings1Proxy::new(&connection)
            .await
            .context("Failed to create settings proxy")?;
        let control = Control1Proxy::new(&connection)
            .await
            .context("Failed to create control proxy")?;

        Ok(Self { settings, control })
    }

    /// Checks if the daemon service exists on the given connection.
    async fn service_exists(conn: &Connection) -> bool {
        use zbus::fdo::DBusProxy;
        let Ok(name) = zbus::names::BusName::try_from(BUS_NAME) else {
            return false;
        };
        match DBusProxy::new(conn).await {
            Ok(dbus_proxy) => dbus_proxy.name_has_owner(name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Returns vendor, name, id and the derived profile ids of the machine.
    pub async fn get_model_info(&self) -> Result<HashMap<String, String>> {
        self.settings
            .get_model_info()
            .await
            .context("Failed to get model info via D-Bus")
    }

    pub async fn get_loaded_profiles(&self) -> Result<Vec<String>> {
        self.settings
            .get_loaded_profiles()
            .await
            .context("Failed to get loaded profiles via D-Bus")
    }

    pub async fn get_profile_comment(&self) -> Result<String> {
        self.settings
            .get_profile_comment()
            .await
            .context("Failed to get profile comment via D-Bus")
    }

    pub async fn is_profile_exactly_matched(&self) -> Result<bool> {
        self.settings
            .is_profile_exactly_matched()
            .await
            .context("Failed to query profile match via D-Bus")
    }

    /// Reloads settings and profile from disk.
    pub async fn load(&self) -> Result<()> {
        self.settings
            .load()
            .await
            .context("Failed to load settings via D-Bus")
    }

    /// Writes settings and the overridden profile to disk.
    pub async fn save(&self) -> Result<()> {
        self.settings
            .save()
            .await
            .context("Failed to save settings via D-Bus")
    }

    pub async fn get_sensor_names(&self) -> Result<HashMap<String, String>> {
        self.settings
            .get_sensor_names()
            .await
            .context("Failed to get sensor names via D-Bus")
    }

    pub async fn set_sensor_names(&self, names: HashMap<String, String>) -> Result<()> {
        self.settings
            .set_sensor_names(names)
            .await
            .context("Failed to set sensor names via D-Bus")
    }

    pub async fn get_trigger_points(&self) -> Result<HashMap<String, HashMap<i32, i32>>> {
        self.settings
            .get_trigger_points()
            .await
            .context("Failed to get trigger points via D-Bus")
    }

    pub async fn set_trigger_points(
        &self,
        triggers: HashMap<String, HashMap<i32, i32>>,
    ) -> Result<()> {
        self.settings
            .set_trigger_points(triggers)
            .await
            .context("Failed to set trigger points via D-Bus")
    }

    pub async fn get_settings(&self) -> Result<HashMap<String, String>> {
        self.settings
            .get_settings()
            .await
            .context("Failed to get settings via D-Bus")
    }

    /// Changes settings; the daemon applies all of them or none.
    pub async fn set_settings(&self, values: HashMap<String, String>) -> Result<()> {
        self.settings
            .set_settings(values)
            .await
            .context("Failed to set settings via D-Bus")
    }

    pub async fn get_profile_string(&self) -> Result<String> {
        self.settings
            .get_profile_string()
            .await
            .context("Failed to get profile via D-Bus")
    }

    pub async fn get_setting_limits(&self, name: &str) -> Result<(i32, i32)> {
        self.settings
            .get_setting_limits(name)
            .await
            .context("Failed to get setting limits via D-Bus")
    }

    pub async fn get_sensor_count(&self) -> Result<u32> {
        self.settings
            .get_sensor_count()
            .await
            .context("Failed to get sensor count via D-Bus")
    }

    /// Adds or replaces a sensor. `scaling` is required for hwmon paths.
    pub async fn add_sensor(
        &self,
        sensor: &str,
        name: &str,
        triggers: HashMap<i32, i32>,
        scaling: Option<f64>,
    ) -> Result<()> {
        let scaling = scaling.map(|s| s.to_string()).unwrap_or_default();
        self.settings
            .add_sensor(sensor, name, triggers, &scaling)
            .await
            .context("Failed to add sensor via D-Bus")
    }

    pub async fn get_available_thermal_sensors(&self) -> Result<Vec<u32>> {
        self.settings
            .get_available_thermal_sensors()
            .await
            .context("Failed to list thermal sensors via D-Bus")
    }

    pub async fn check_if_hwmon_sensor_exists(&self, path: &str) -> Result<bool> {
        self.settings
            .check_if_hwmon_sensor_exists(path)
            .await
            .context("Failed to check hwmon sensor via D-Bus")
    }

    pub async fn get_version(&self) -> Result<String> {
        self.control
            .get_version()
            .await
            .context("Failed to get daemon version via D-Bus")
    }

    pub async fn get_temperatures(&self) -> Result<Vec<i32>> {
        self.control
            .get_temperatures()
            .await
            .context("Failed to get temperatures via D-Bus")
    }

    /// Returns the fan `level` and `rpm`.
    pub async fn get_fan_state(&self) -> Result<HashMap<String, i32>> {
        self.control
            .get_fan_state()
            .await
            .context("Failed to get fan state via D-Bus")
    }

    pub async fn reset_trips(&self) -> Result<()> {
        self.control
            .reset_trips()
            .await
            .context("Failed to reset trips via D-Bus")
    }

    pub async fn get_trip_temperatures(&self) -> Result<HashMap<String, i32>> {
        self.control
            .get_trip_temperatures()
            .await
            .context("Failed to get trip temperatures via D-Bus")
    }

    pub async fn get_trip_fan_speeds(&self) -> Result<HashMap<String, i32>> {
        self.control
            .get_trip_fan_speeds()
            .await
            .context("Failed to get trip fan speeds via D-Bus")
    }
}
