#![forbid(unsafe_code)]

//! Process settings: a JSON file, every field optional, overridden by CLI
//! flags.
//!
//! These are wiring-time settings (what to build). Component parameters
//! that can change while running live in the configuration store instead.

use std::fs;
use std::path::{Path, PathBuf};

use sensflow_runtime::SystemSensorLevel;
use serde::{Deserialize, Serialize};

use crate::error::{DemoError, Result};

/// One simulated one-wire temperature probe and where its reading goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    pub name: String,
    /// Configuration path prefix; `/oneWire` and `/linear` are appended.
    pub config_prefix: String,
    pub telemetry_path: String,
    /// Simulated resting temperature in kelvin.
    pub base_kelvin: f64,
}

impl ProbeSettings {
    fn new(name: &str, config_prefix: &str, telemetry_path: &str, base_kelvin: f64) -> Self {
        Self {
            name: name.to_owned(),
            config_prefix: config_prefix.to_owned(),
            telemetry_path: telemetry_path.to_owned(),
            base_kelvin,
        }
    }
}

/// The ultrasonic bilge level chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelSettings {
    pub telemetry_path: String,
    pub input_config_path: String,
    pub linear_config_path: String,
    pub average_config_path: String,
    /// Echo pulse width (µs) to centimetres.
    pub multiplier: f64,
    pub offset: f64,
    pub window: usize,
    pub scale: f64,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            telemetry_path: "bilge.currentLevel".to_owned(),
            input_config_path: "/bilge/ultrasonic_in".to_owned(),
            linear_config_path: "/bilge/linear".to_owned(),
            average_config_path: "/bilge/samples".to_owned(),
            multiplier: 0.01724,
            offset: 0.0,
            window: 10,
            scale: 1.0,
        }
    }
}

/// Knobs for the simulated hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    /// Every Nth bus transaction fails; 0 disables faults.
    pub fault_every: u32,
    /// Time between the ultrasonic trigger and a readable echo.
    pub echo_delay_ms: u64,
    /// Simulated water depth below the ranger, in centimetres.
    pub bilge_depth_cm: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fault_every: 0,
            echo_delay_ms: 30,
            bilge_depth_cm: 42.0,
        }
    }
}

/// Built-in device telemetry under `sensorDevice.{hostname}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemSettings {
    pub sensors: SystemSensorLevel,
    pub read_delay_ms: u64,
    /// Telemetry server; the local address is the one routed towards it.
    pub telemetry_server: String,
    /// Publish this address instead of looking it up.
    pub ip_address: Option<String>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            sensors: SystemSensorLevel::IpAddress,
            read_delay_ms: 10_000,
            telemetry_server: "192.168.0.1:3000".to_owned(),
            ip_address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub hostname: String,
    pub read_delay_ms: u64,
    /// Root of the JSON configuration store; `None` keeps parameters in memory.
    pub config_dir: Option<PathBuf>,
    pub queue_capacity: usize,
    pub probes: Vec<ProbeSettings>,
    pub level: LevelSettings,
    pub simulation: SimulationSettings,
    pub system: SystemSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: "bilge-temp-monitor".to_owned(),
            read_delay_ms: 1000,
            config_dir: None,
            queue_capacity: sensflow_runtime::DEFAULT_QUEUE_CAPACITY,
            probes: vec![
                ProbeSettings::new(
                    "bilge",
                    "/bilgeWaterTemperature",
                    "environment.bilge.waterTemperature",
                    284.15,
                ),
                ProbeSettings::new("outside", "/outsideTemperature", "environment.outside.temperature", 290.65),
                ProbeSettings::new("cabin", "/cabinTemperature", "environment.inside.temperature", 294.15),
            ],
            level: LevelSettings::default(),
            simulation: SimulationSettings::default(),
            system: SystemSettings::default(),
        }
    }
}

impl Settings {
    /// Read `path`. A missing file is an error; use [`Settings::default`]
    /// when no file was given.
    pub fn load(path: &Path) -> Result<Self> {
        let wrap = |source: DemoError| DemoError::Settings {
            path: path.to_path_buf(),
            source: Box::new(source),
        };
        let text = fs::read_to_string(path).map_err(|e| wrap(e.into()))?;
        let settings: Self = serde_json::from_str(&text).map_err(|e| wrap(e.into()))?;
        settings.validate().map_err(wrap)?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(DemoError::invalid("hostname must not be empty"));
        }
        if self.read_delay_ms == 0 {
            return Err(DemoError::invalid("read_delay_ms must be at least 1"));
        }
        if self.system.read_delay_ms == 0 {
            return Err(DemoError::invalid("system.read_delay_ms must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(DemoError::invalid("queue_capacity must be at least 1"));
        }
        if !(1..=1000).contains(&self.level.window) {
            return Err(DemoError::invalid("level.window must be within 1..=1000"));
        }
        for (i, probe) in self.probes.iter().enumerate() {
            if !probe.config_prefix.starts_with('/') {
                return Err(DemoError::invalid(format!(
                    "probe {} config_prefix must start with '/'",
                    probe.name
                )));
            }
            if self.probes[..i].iter().any(|p| p.config_prefix == probe.config_prefix) {
                return Err(DemoError::invalid(format!(
                    "probe config_prefix {} is used twice",
                    probe.config_prefix
                )));
            }
        }
        Ok(())
    }
}
