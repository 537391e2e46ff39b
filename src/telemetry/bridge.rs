use super::{ActuatorCommand, DeviceLayer};

use tracing::{debug, info, warn};

use std::sync::Arc;

/// Reads sensor values from, and issues commands to, the device layer.
///
/// Nothing here fails: a missing device type is a legitimate deployment and a
/// faulting device is logged and skipped without affecting the others.
#[derive(Clone)]
pub struct TelemetryBridge {
    devices: Arc<dyn DeviceLayer>,
}

impl TelemetryBridge {
    pub fn new(devices: Arc<dyn DeviceLayer>) -> Self {
        TelemetryBridge { devices }
    }

    /// Sum of `signal` over every device of `device_type`.
    pub fn read_aggregate(&self, device_type: &str, signal: &str) -> f64 {
        let mut total = 0.0;
        for device in self.devices.devices_of_type(device_type) {
            match device.get_state(signal) {
                Ok(value) => total += value,
                Err(err) => warn!("skipping {} in {} total: {}", device.id(), signal, err),
            }
        }
        total
    }

    /// `signal` as read from the first device of `device_type`.
    pub fn read_single(&self, device_type: &str, signal: &str) -> Option<f64> {
        let devices = self.devices.devices_of_type(device_type);
        let device = match devices.first() {
            Some(device) => device,
            None => {
                info!("no device of type {} to read {}", device_type, signal);
                return None;
            }
        };
        match device.get_state(signal) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("reading {} from {} failed: {}", signal, device.id(), err);
                None
            }
        }
    }

    /// Commands every device of the target type and returns how many accepted it.
    pub fn apply_command(&self, command: &ActuatorCommand) -> usize {
        let devices = self.devices.devices_of_type(&command.device_type);
        if devices.is_empty() {
            info!("couldn't find device type {}", command.device_type);
            return 0;
        }
        let mut applied = 0;
        for device in devices.iter() {
            debug!("{} = {} -> {}", command.signal, command.value, device.id());
            match device.set_command(&command.signal, command.value) {
                Ok(()) => applied += 1,
                Err(err) => warn!("command {} to {} failed: {}", command.signal, device.id(), err),
            }
        }
        applied
    }
}
