//! tpfan Control Tool
//!
//! CLI for controlling the tpfan daemon via D-Bus.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashMap};
use tpfan_client::{BusType, DaemonClient};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliBusType {
    /// Try system bus first, fall back to session bus
    #[default]
    Auto,
    /// Use session bus (for development)
    Session,
    /// Use system bus
    System,
}

impl From<CliBusType> for BusType {
    fn from(bus: CliBusType) -> Self {
        match bus {
            CliBusType::Auto => BusType::Auto,
            CliBusType::Session => BusType::Session,
            CliBusType::System => BusType::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "tpfanctl")]
#[command(about = "Control tool for the tpfan daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// D-Bus bus type to use
    #[arg(long, default_value = "auto", value_enum)]
    bus: CliBusType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show fan, temperatures and settings
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List configured sensors with their trigger points
    Sensors,
    /// Show or change global settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },
    /// Enable fan control
    Enable,
    /// Disable fan control (fan returns to automatic mode)
    Disable,
    /// Switch profile override mode
    Override {
        #[arg(value_enum)]
        mode: OnOff,
    },
    /// Profile commands
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },
    /// Trigger point commands
    Triggers {
        #[command(subcommand)]
        action: TriggerCommands,
    },
    /// Sensor name commands
    Names {
        #[command(subcommand)]
        action: NameCommands,
    },
    /// Sensor commands
    Sensor {
        #[command(subcommand)]
        action: SensorCommands,
    },
    /// Trip point commands
    Trips {
        #[command(subcommand)]
        action: TripCommands,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show all settings
    Show,
    /// Change settings, e.g. `set enabled true hysteresis 3`
    Set {
        /// Alternating setting names and values
        #[arg(required = true, num_args = 2..)]
        pairs: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Print the active profile
    Show,
    /// Reload settings and profile from disk
    Load,
    /// Write settings and profile to disk
    Save,
}

#[derive(Subcommand)]
enum TriggerCommands {
    /// Replace the trigger points of one sensor
    Set {
        /// Sensor index or hwmon path
        sensor: String,
        /// Trigger points as TEMP:LEVEL (level may be auto, disengaged, full-speed)
        #[arg(required = true)]
        points: Vec<String>,
    },
}

#[derive(Subcommand)]
enum NameCommands {
    /// Rename one sensor
    Set {
        /// Sensor index or hwmon path
        sensor: String,
        /// New name
        name: String,
    },
}

#[derive(Subcommand)]
enum SensorCommands {
    /// Add or replace a sensor
    Add {
        /// Sensor index or hwmon path
        sensor: String,
        /// Sensor name
        name: String,
        /// Trigger points as TEMP:LEVEL
        #[arg(required = true)]
        points: Vec<String>,
        /// Scaling factor for hwmon inputs (0.001 for millidegrees)
        #[arg(long)]
        scaling: Option<f64>,
    },
    /// List thinkpad_acpi sensors that report a temperature
    Available,
    /// Check whether an hwmon input file exists
    Check {
        /// Path of the hwmon input
        path: String,
    },
}

#[derive(Subcommand)]
enum TripCommands {
    /// Show latched trip points
    Show,
    /// Clear all trip points
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Connect to daemon
    let client = DaemonClient::connect_with_bus(cli.bus.into())
        .await
        .context("Failed to connect to daemon. Is tpfand running?")?;

    match cli.command {
        Commands::Status { json } => handle_status(json, &client).await,
        Commands::Sensors => handle_sensors(&client).await,
        Commands::Settings { action } => handle_settings(action, &client).await,
        Commands::Enable => set_one(&client, "enabled", "true").await,
        Commands::Disable => set_one(&client, "enabled", "false").await,
        Commands::Override { mode } => {
            let value = matches!(mode, OnOff::On).to_string();
            set_one(&client, "override_profile", &value).await
        }
        Commands::Profile { action } => handle_profile(action, &client).await,
        Commands::Triggers { action } => handle_triggers(action, &client).await,
        Commands::Names { action } => handle_names(action, &client).await,
        Commands::Sensor { action } => handle_sensor(action, &client).await,
        Commands::Trips { action } => handle_trips(action, &client).await,
    }
}

async fn handle_status(json: bool, client: &DaemonClient) -> Result<()> {
    let version = client.get_version().await?;
    let fan = client.get_fan_state().await?;
    let settings = client.get_settings().await?;
    let model = client.get_model_info().await?;
    let profiles = client.get_loaded_profiles().await?;
    let matched = client.is_profile_exactly_matched().await?;
    // The thermal file may be disabled on the daemon side.
    let temperatures = client.get_temperatures().await.ok();

    if json {
        let status = serde_json::json!({
            "version": version,
            "fan": {
                "level": fan.get("level"),
                "rpm": fan.get("rpm"),
            },
            "temperatures": temperatures,
            "settings": sorted(&settings),
            "model": sorted(&model),
            "loaded_profiles": profiles,
            "profile_matched": matched,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("tpfand {}", version);
    println!(
        "Model: {} {} ({})",
        model.get("vendor").map_or("", String::as_str),
        model.get("name").map_or("", String::as_str),
        model.get("id").map_or("", String::as_str)
    );
    println!(
        "Fan: {} ({} rpm)",
        fan.get("level").map_or("unknown".to_string(), |l| level_name(*l)),
        fan.get("rpm").copied().unwrap_or_default()
    );
    match temperatures {
        Some(temps) => println!(
            "Temperatures: {}",
            temps
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        ),
        None => println!("Temperatures: unavailable"),
    }
    println!(
        "Profile: {}{}",
        if profiles.is_empty() {
            "none".to_string()
        } else {
            profiles.join(", ")
        },
        if matched { " (exact match)" } else { "" }
    );
    println!("Settings:");
    for (key, value) in sorted(&settings) {
        println!("  {}: {}", key, value);
    }
    Ok(())
}

async fn handle_sensors(client: &DaemonClient) -> Result<()> {
    let names = client.get_sensor_names().await?;
    let triggers = client.get_trigger_points().await?;
    if triggers.is_empty() {
        println!("No sensors configured");
        return Ok(());
    }

    let mut sensors: Vec<&String> = triggers.keys().collect();
    sensors.sort_by_key(|s| sensor_sort_key(s));
    for sensor in sensors {
        let name = names.get(sensor).map_or("", String::as_str);
        println!("{} ({})", sensor, name);
        let table: BTreeMap<_, _> = triggers[sensor].iter().collect();
        for (temp, level) in table {
            println!("  {:>3}°C -> {}", temp, level_name(*level));
        }
    }
    Ok(())
}

async fn handle_settings(action: SettingsCommands, client: &DaemonClient) -> Result<()> {
    match action {
        SettingsCommands::Show => {
            let settings = client.get_settings().await?;
            for (key, value) in sorted(&settings) {
                println!("{}: {}", key, value);
            }
            let (min, max) = client.get_setting_limits("hysteresis").await?;
            println!("(hysteresis range {}-{})", min, max);
        }
        SettingsCommands::Set { pairs } => {
            let values = parse_pairs(&pairs)?;
            client.set_settings(values.clone()).await?;
            for (key, value) in sorted(&values) {
                println!("{} set to: {}", key, value);
            }
        }
    }

    Ok(())
}

async fn set_one(client: &DaemonClient, key: &str, value: &str) -> Result<()> {
    let values = HashMap::from([(key.to_string(), value.to_string())]);
    client.set_settings(values).await?;
    println!("{} set to: {}", key, value);
    Ok(())
}

async fn handle_profile(action: ProfileCommands, client: &DaemonClient) -> Result<()> {
    match action {
        ProfileCommands::Show => {
            let comment = client.get_profile_comment().await?;
            if !comment.is_empty() {
                println!("# {}", comment);
            }
            print!("{}", client.get_profile_string().await?);
        }
        ProfileCommands::Load => {
            client.load().await?;
            println!("Settings reloaded");
        }
        ProfileCommands::Save => {
            client.save().await?;
            println!("Settings saved");
        }
    }

    Ok(())
}

async fn handle_triggers(action: TriggerCommands, client: &DaemonClient) -> Result<()> {
    match action {
        TriggerCommands::Set { sensor, points } => {
            let table = parse_points(&points)?;
            let mut triggers = client.get_trigger_points().await?;
            triggers.insert(sensor.clone(), table);
            client.set_trigger_points(triggers).await?;
            println!("Trigger points of sensor {} updated", sensor);
        }
    }

    Ok(())
}

async fn handle_names(action: NameCommands, client: &DaemonClient) -> Result<()> {
    match action {
        NameCommands::Set { sensor, name } => {
            let mut names = client.get_sensor_names().await?;
            names.insert(sensor.clone(), name.clone());
            client.set_sensor_names(names).await?;
            println!("Sensor {} renamed to: {}", sensor, name);
        }
    }

    Ok(())
}

async fn handle_sensor(action: SensorCommands, client: &DaemonClient) -> Result<()> {
    match action {
        SensorCommands::Add {
            sensor,
            name,
            points,
            scaling,
        } => {
            let table = parse_points(&points)?;
            client.add_sensor(&sensor, &name, table, scaling).await?;
            println!("Sensor {} ({}) added", sensor, name);
        }
        SensorCommands::Available => {
            let sensors = client.get_available_thermal_sensors().await?;
            println!("Connected thermal sensors:");
            for index in sensors {
                println!("  {}", index);
            }
        }
        SensorCommands::Check { path } => {
            if client.check_if_hwmon_sensor_exists(&path).await? {
                println!("{} exists", path);
            } else {
                anyhow::bail!("{} does not exist", path);
            }
        }
    }

    Ok(())
}

async fn handle_trips(action: TripCommands, client: &DaemonClient) -> Result<()> {
    match action {
        TripCommands::Show => {
            let temperatures = client.get_trip_temperatures().await?;
            let levels = client.get_trip_fan_speeds().await?;
            if temperatures.is_empty() {
                println!("No trip points");
                return Ok(());
            }
            let mut sensors: Vec<&String> = temperatures.keys().collect();
            sensors.sort_by_key(|s| sensor_sort_key(s));
            for sensor in sensors {
                println!(
                    "{}: {} until below {}°C",
                    sensor,
                    levels.get(sensor).map_or("?".to_string(), |l| level_name(*l)),
                    temperatures[sensor]
                );
            }
        }
        TripCommands::Reset => {
            client.reset_trips().await?;
            println!("Trip points reset");
        }
    }

    Ok(())
}

/// Parses `TEMP:LEVEL` arguments.
fn parse_points(points: &[String]) -> Result<HashMap<i32, i32>> {
    points
        .iter()
        .map(|point| -> Result<(i32, i32)> {
            let (temp, level) = point
                .split_once(':')
                .with_context(|| {
                    format!("Invalid trigger point '{}', expected TEMP:LEVEL", point)
                })?;
            let temp = temp
                .trim()
                .parse::<i32>()
                .with_context(|| format!("Invalid temperature in '{}'", point))?;
            Ok((temp, parse_level(level)?))
        })
        .collect()
}

fn parse_level(level: &str) -> Result<i32> {
    match level.trim().to_lowercase().as_str() {
        "off" => Ok(0),
        "disengaged" => Ok(254),
        "auto" => Ok(255),
        "full-speed" | "full_speed" => Ok(256),
        other => other
            .parse::<i32>()
            .with_context(|| format!("Invalid fan level '{}'", level)),
    }
}

fn level_name(level: i32) -> String {
    match level {
        0 => "off".to_string(),
        254 => "disengaged".to_string(),
        255 => "auto".to_string(),
        256 => "full-speed".to_string(),
        n => n.to_string(),
    }
}

/// Pairs alternating `KEY VALUE` arguments.
fn parse_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    if pairs.len() % 2 != 0 {
        anyhow::bail!("Settings must be given as KEY VALUE pairs");
    }
    Ok(pairs
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

fn sorted<V: Clone>(map: &HashMap<String, V>) -> BTreeMap<String, V> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Indexed sensors first in numeric order, then paths.
fn sensor_sort_key(sensor: &str) -> (bool, u32, String) {
    match sensor.parse::<u32>() {
        Ok(index) => (false, index, String::new()),
        Err(_) => (true, 0, sensor.to_string()),
    }
}
