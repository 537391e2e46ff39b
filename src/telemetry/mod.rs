//! Access to the device layer: named signals on typed devices.
mod bridge;
mod registry;

pub use bridge::TelemetryBridge;
pub use registry::{DeviceRegistry, SimulatedDevice};

use crate::Result;

use std::sync::Arc;

/// A single device exposed by the device layer.
pub trait Device: Send + Sync {
    fn id(&self) -> &str;

    fn device_type(&self) -> &str;

    fn get_state(&self, signal: &str) -> Result<f64>;

    fn set_command(&self, signal: &str, value: f64) -> Result<()>;
}

/// The device layer looks up devices by their type.
pub trait DeviceLayer: Send + Sync {
    /// All devices of `device_type`, ordered by device id. Empty when the type is
    /// not deployed.
    fn devices_of_type(&self, device_type: &str) -> Vec<Arc<dyn Device>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    pub device_type: String,
    pub signal: String,
    pub value: f64,
}

impl ActuatorCommand {
    pub fn new(device_type: &str, signal: &str, value: f64) -> Self {
        ActuatorCommand { device_type: device_type.to_owned(), signal: signal.to_owned(), value }
    }
}
