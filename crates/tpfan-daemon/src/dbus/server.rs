//! Bus connection and object registration.

use std::sync::Arc;

use tracing::{info, warn};
use zbus::Connection;

use super::{Control1Interface, Settings1Interface};
use crate::config::DbusBusType;
use crate::state::AppState;

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "org.tpfan.Daemon";
/// Object path of the settings interface.
pub const SETTINGS_PATH: &str = "/org/tpfan/Settings";
/// Object path of the control interface.
pub const CONTROL_PATH: &str = "/org/tpfan/Control";

/// Connects to the appropriate D-Bus bus based on configuration.
async fn connect_to_bus(bus_type: DbusBusType) -> anyhow::Result<(Connection, &'static str)> {
    match bus_type {
        DbusBusType::Session => {
            let conn = Connection::session()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to session bus: {}", e))?;
            Ok((conn, "session"))
        }
        DbusBusType::System => {
            let conn = Connection::system()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
            Ok((conn, "system"))
        }
        DbusBusType::Auto => match Connection::system().await {
            Ok(conn) => Ok((conn, "system")),
            Err(system_err) => {
                warn!(
                    "System bus unavailable ({}), trying session bus",
                    system_err
                );
                let conn = Connection::session().await.map_err(|session_err| {
                    anyhow::anyhow!(
                        "Failed to connect to any D-Bus: system={}, session={}",
                        system_err,
                        session_err
                    )
                })?;
                Ok((conn, "session"))
            }
        },
    }
}

/// Registers both interfaces and claims the bus name.
///
/// The returned connection must be kept alive for the service to stay up.
pub async fn run_dbus_server(
    state: Arc<AppState>,
    bus_type: DbusBusType,
) -> anyhow::Result<Connection> {
    let (connection, bus_name) = connect_to_bus(bus_type).await?;

    connection
        .object_server()
        .at(SETTINGS_PATH, Settings1Interface::new(state.clone()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register {}: {}", SETTINGS_PATH, e))?;
    connection
        .object_server()
        .at(CONTROL_PATH, Control1Interface::new(state))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register {}: {}", CONTROL_PATH, e))?;

    connection
        .request_name(BUS_NAME)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to request bus name: {}", e))?;

    info!("D-Bus service registered at {} on {} bus", BUS_NAME, bus_name);
    Ok(connection)
}
