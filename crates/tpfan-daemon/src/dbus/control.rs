//! The `org.tpfan.Control1` interface.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use zbus::interface;

use super::DaemonError;
use crate::state::AppState;

/// Live readings and trip state.
pub struct Control1Interface {
    state: Arc<AppState>,
}

impl Control1Interface {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[interface(name = "org.tpfan.Control1")]
impl Control1Interface {
    fn get_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Raw thinkpad_acpi temperatures, indexed by sensor.
    fn get_temperatures(&self) -> Result<Vec<i32>, DaemonError> {
        match self.state.controller().temperatures() {
            Some(temperatures) => Ok(temperatures?),
            None => Err(DaemonError::Unavailable(
                "thermal file disabled".to_string(),
            )),
        }
    }

    /// Returns `level` and `rpm` of the fan.
    fn get_fan_state(&self) -> Result<HashMap<String, i32>, DaemonError> {
        let state = self.state.controller().fan_state()?;
        Ok(HashMap::from([
            ("level".to_string(), i32::from(state.level.value())),
            (
                "rpm".to_string(),
                i32::try_from(state.rpm).unwrap_or(i32::MAX),
            ),
        ]))
    }

    fn reset_trips(&self) {
        self.state.controller().reset_trips();
        info!("D-Bus: ResetTrips");
    }

    /// Release temperature of each tripped sensor.
    fn get_trip_temperatures(&self) -> HashMap<String, i32> {
        self.state
            .controller()
            .trips()
            .iter()
            .map(|(sensor, trip)| (sensor.to_string(), trip.temperature))
            .collect()
    }

    /// Latched fan level of each tripped sensor.
    fn get_trip_fan_speeds(&self) -> HashMap<String, i32> {
        self.state
            .controller()
            .trips()
            .iter()
            .map(|(sensor, trip)| (sensor.to_string(), i32::from(trip.level)))
            .collect()
    }

    #[zbus(property)]
    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}
