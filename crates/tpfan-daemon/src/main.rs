//! tpfan Daemon
//!
//! Fan control service for ThinkPad notebooks with a D-Bus interface for
//! settings and live state.

mod config;
mod control;
mod dbus;
mod settings;
mod state;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tpfan_hw::{AcpiFan, AcpiThermal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

/// Fan control daemon for ThinkPad notebooks
#[derive(Parser, Debug)]
#[command(name = "tpfand", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/tpfan/tpfand.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run without /proc/acpi/ibm/thermal, using hwmon sensors only
    #[arg(long)]
    no_thermal: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = Config::load_or_default(&args.config).context("Failed to load configuration")?;
    info!(
        "tpfand {} starting with configuration {}",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );

    check_system(&config, args.no_thermal)?;

    let _pid_file = PidFile::create(&config.paths.pid_file)?;
    run(config, args.no_thermal).await
}

/// Checks the kernel interfaces before anything touches the fan.
fn check_system(config: &Config, no_thermal: bool) -> Result<()> {
    let mut fan = AcpiFan::new(&config.paths.fan);
    if let Err(e) = fan.probe(config.watchdog_time) {
        bail!(
            "Cannot control the fan through {}: {}. {}",
            fan.path().display(),
            e,
            setup_hint()
        );
    }

    if !no_thermal {
        let thermal = AcpiThermal::new(&config.paths.thermal);
        let temperatures = thermal.read().with_context(|| {
            format!(
                "Cannot read temperatures from {}",
                thermal.path().display()
            )
        })?;
        debug!("Thermal sensors: {:?}", temperatures);
    }
    Ok(())
}

fn setup_hint() -> &'static str {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        "tpfand must run as root"
    } else {
        "Load thinkpad_acpi with fan_control=1"
    }
}

async fn run(config: Config, no_thermal: bool) -> Result<()> {
    let state = Arc::new(AppState::new(&config, no_thermal));

    // Start D-Bus service
    let _dbus_connection = match dbus::run_dbus_server(state.clone(), config.dbus.bus).await {
        Ok(conn) => {
            info!("D-Bus service started");
            Some(conn)
        }
        Err(e) => {
            warn!(
                "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                e
            );
            None
        }
    };

    // Setup Unix signal handlers before the loop owns the fan
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_state = state.clone();
    let control = tokio::spawn(async move {
        control_loop(control_state, shutdown_rx).await;
    });

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = control.await {
        error!("Control loop ended abnormally: {}", e);
    }
    state.shutdown();
    Ok(())
}

/// Runs control cycles until shutdown. A running cycle is never interrupted.
async fn control_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let next = state.poll();
        tokio::select! {
            _ = tokio::time::sleep(next) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    debug!("Control loop stopped");
}

/// Marks a running daemon; removed on drop.
#[derive(Debug)]
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => bail!(
                "{} exists. Another tpfand may be running; remove the file if it is stale",
                path.display()
            ),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create pid file {}", path.display()))
            }
        };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpfand.pid");

        let pid_file = PidFile::create(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        let err = PidFile::create(&path).unwrap_err();
        assert!(err.to_string().contains("Another tpfand may be running"));
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_check_system_needs_fan_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.fan = dir.path().join("missing/fan");
        config.paths.thermal = dir.path().join("thermal");
        assert!(check_system(&config, true).is_err());

        config.paths.fan = dir.path().join("fan");
        fs::write(&config.paths.fan, "").unwrap();
        assert!(check_system(&config, true).is_ok());
        assert!(check_system(&config, false).is_err());

        fs::write(&config.paths.thermal, "temperatures:\t45 0 -128\n").unwrap();
        assert!(check_system(&config, false).is_ok());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["tpfand"]);
        assert_eq!(args.config, PathBuf::from("/etc/tpfan/tpfand.toml"));
        assert!(!args.debug);
        assert!(!args.no_thermal);
    }
}
