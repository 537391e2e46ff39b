use crate::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::time::Duration;

// For explanation, see issue: https://github.com/serde-rs/serde/issues/368
fn default_node_id() -> String {
    "vvc-slave-1".to_owned()
}
fn default_listener_ip() -> String {
    "0.0.0.0:5002".to_owned()
}
fn default_module() -> String {
    crate::message::VVC_MODULE.to_owned()
}
fn default_round_time_ms() -> u64 {
    2_000
}
fn default_request_timeout_ms() -> u64 {
    1_000
}
fn default_phases() -> Vec<PhaseSettings> {
    vec![
        PhaseSettings { module: "gm".to_owned(), duration_ms: 2_000 },
        PhaseSettings { module: default_module(), duration_ms: 10_000 },
    ]
}
fn default_coordinator() -> String {
    "explosion.ece.ncsu.edu:5001".to_owned()
}
fn default_validity_floor() -> f64 {
    -10.0
}
fn default_measurement() -> SignalSettings {
    SignalSettings::new("SST1", "AOUT/Active_Pwr_Fb")
}
fn default_actuator_slots() -> Vec<String> {
    vec!["SST1".to_owned(), "SST2".to_owned(), "SST3".to_owned()]
}
fn default_command_signal() -> String {
    "AIN/Reactive_Pwr_cmd".to_owned()
}

const DEFAULT_SETTINGS_PATH: &str = "src/server/settings/Default.json";
const ENV_PREFIX: &str = "VVC";

/// A named signal on a device type.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SignalSettings {
    pub device_type: String,
    pub signal: String,
}

impl SignalSettings {
    pub fn new(device_type: &str, signal: &str) -> Self {
        SignalSettings { device_type: device_type.to_owned(), signal: signal.to_owned() }
    }
}

/// Device signals summed into the grid totals each round.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TotalsSettings {
    pub generation: SignalSettings,
    pub storage: SignalSettings,
    pub load: SignalSettings,
    pub gateway: SignalSettings,
}

impl Default for TotalsSettings {
    fn default() -> Self {
        TotalsSettings {
            generation: SignalSettings::new("Drer", "generation"),
            storage: SignalSettings::new("Desd", "storage"),
            load: SignalSettings::new("Load", "drain"),
            gateway: SignalSettings::new("Sst", "gateway"),
        }
    }
}

/// The advisory broadcast to every peer each round.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdvisorySettings {
    pub control_factor: u32,
    pub phase_measurement: f64,
    pub reading_location: String,
}

impl Default for AdvisorySettings {
    fn default() -> Self {
        AdvisorySettings {
            control_factor: 2,
            phase_measurement: 3.0,
            reading_location: "SSTI SSTII SSTIII".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ControlSettings {
    /// Address of the peer computing gradients for this node.
    #[serde(default = "default_coordinator")]
    pub coordinator_address: String,
    /// Local readings at or below this value are not reported.
    #[serde(default = "default_validity_floor")]
    pub validity_floor: f64,
    #[serde(default = "default_measurement")]
    pub measurement: SignalSettings,
    /// Device type per actuator slot, in gradient order.
    #[serde(default = "default_actuator_slots")]
    pub actuator_slots: Vec<String>,
    #[serde(default = "default_command_signal")]
    pub command_signal: String,
    #[serde(default)]
    pub totals: TotalsSettings,
    #[serde(default)]
    pub advisory: AdvisorySettings,
}

impl Default for ControlSettings {
    fn default() -> Self {
        ControlSettings {
            coordinator_address: default_coordinator(),
            validity_floor: default_validity_floor(),
            measurement: default_measurement(),
            actuator_slots: default_actuator_slots(),
            command_signal: default_command_signal(),
            totals: TotalsSettings::default(),
            advisory: AdvisorySettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PhaseSettings {
    pub module: String,
    pub duration_ms: u64,
}

/// An initial signal value. Signal names are kept as values rather than map keys
/// because configuration keys are case-folded.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SignalValue {
    pub name: String,
    pub value: f64,
}

/// A simulated device registered at startup.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeviceSettings {
    pub id: String,
    pub device_type: String,
    #[serde(default)]
    pub signals: Vec<SignalValue>,
}

impl DeviceSettings {
    pub fn initial_signals(&self) -> HashMap<String, f64> {
        self.signals.iter().map(|signal| (signal.name.clone(), signal.value)).collect()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_listener_ip")]
    pub listener_ip: String,
    /// The module tag this agent answers to.
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default = "default_round_time_ms")]
    pub round_time_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseSettings>,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_id: default_node_id(),
            listener_ip: default_listener_ip(),
            module: default_module(),
            round_time_ms: default_round_time_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            phases: default_phases(),
            control: ControlSettings::default(),
            devices: vec![],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub enum ENV {
    Testing,
    Development,
    Production,
}

impl fmt::Display for ENV {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ENV::Testing => write!(f, "Testing"),
            ENV::Production => write!(f, "Production"),
            ENV::Development => write!(f, "Development"),
        }
    }
}

impl From<&str> for ENV {
    fn from(env: &str) -> Self {
        match env {
            "Testing" => ENV::Testing,
            "Production" => ENV::Production,
            _ => ENV::Development,
        }
    }
}

impl Settings {
    /// Loads the default settings file, overridden by `VVC_*` environment variables
    /// (nested keys separated by `__`, e.g. `VVC_CONTROL__VALIDITY_FLOOR`).
    pub fn new() -> Result<Self> {
        Settings::load(DEFAULT_SETTINGS_PATH)
    }

    /// Loads `path`, then the optional per-environment file next to it named after
    /// `RUN_ENV` (e.g. `Production.json`), then the environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let env = ENV::from(std::env::var("RUN_ENV").unwrap_or_else(|_| "Development".into()).as_str());
        Settings::load_for(path, &env)
    }

    pub fn load_for(path: &str, env: &ENV) -> Result<Self> {
        let overlay = Path::new(path).with_file_name(env.to_string());
        let overlay = overlay
            .to_str()
            .ok_or_else(|| Error::InvalidSettings(format!("unusable settings path {}", path)))?;
        let settings: Settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(File::with_name(overlay).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.round_time_ms == 0 {
            return Err(Error::InvalidSettings("round_time_ms must be positive".to_owned()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidSettings("request_timeout_ms must be positive".to_owned()));
        }
        if !self.phases.iter().any(|phase| phase.module == self.module) {
            return Err(Error::InvalidSettings(format!("no phase for module {}", self.module)));
        }
        if let Some(phase) = self.phases.iter().find(|phase| phase.duration_ms == 0) {
            return Err(Error::InvalidSettings(format!("phase {} has no duration", phase.module)));
        }
        if self.control.actuator_slots.is_empty() {
            return Err(Error::InvalidSettings("at least one actuator slot is required".to_owned()));
        }
        Ok(())
    }

    pub fn round_time(&self) -> Duration {
        Duration::from_millis(self.round_time_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
