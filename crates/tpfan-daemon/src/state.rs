//! Application state management.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tpfan_hw::{AcpiFan, AcpiThermal, FanInterface, ModelInfo};
use tracing::{error, info};

use crate::config::Config;
use crate::control::Controller;
use crate::settings::Settings;

/// State shared by the control loop and the D-Bus interfaces.
///
/// Lock order is settings, then controller.
pub struct AppState {
    settings: Mutex<Settings>,
    controller: Mutex<Controller>,
    watchdog_time: u32,
}

impl AppState {
    /// Creates the state from configuration and loads the settings.
    ///
    /// A settings load failure is logged and the daemon starts disabled,
    /// leaving the fan in automatic mode until `load` succeeds.
    pub fn new(config: &Config, no_thermal: bool) -> Self {
        let model = ModelInfo::read(&config.paths.dmi);
        info!(
            "Model: {} {} ({}), profile id {}",
            model.vendor, model.name, model.id, model.profile_id
        );

        let mut settings = Settings::new(config, model);
        if let Err(e) = settings.load() {
            error!("Failed to load settings, fan control disabled: {}", e);
        }

        let thermal = (!no_thermal).then(|| AcpiThermal::new(&config.paths.thermal));
        let fan: Box<dyn FanInterface> = Box::new(AcpiFan::new(&config.paths.fan));

        Self::from_parts(
            settings,
            Controller::new(fan, thermal),
            config.watchdog_time,
        )
    }

    pub fn from_parts(settings: Settings, controller: Controller, watchdog_time: u32) -> Self {
        Self {
            settings: Mutex::new(settings),
            controller: Mutex::new(controller),
            watchdog_time,
        }
    }

    /// Locks the settings store.
    pub fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the controller. Never call while holding only this and then
    /// take the settings lock.
    pub fn controller(&self) -> MutexGuard<'_, Controller> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one control cycle; returns the delay until the next one.
    pub fn poll(&self) -> Duration {
        let settings = self.settings();
        let mut controller = self.controller();
        controller.poll(&settings)
    }

    /// Returns the fan to automatic mode.
    pub fn shutdown(&self) {
        self.controller().release(self.watchdog_time);
    }
}
