use super::{Device, DeviceLayer};
use crate::{Error, Result};

use tracing::debug;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// An in-process device whose signals are plain values. Commands are stored
/// under their signal name and can be read back as state.
#[derive(Debug)]
pub struct SimulatedDevice {
    id: String,
    device_type: String,
    signals: Mutex<HashMap<String, f64>>,
}

impl SimulatedDevice {
    pub fn new(id: &str, device_type: &str, signals: HashMap<String, f64>) -> Self {
        SimulatedDevice {
            id: id.to_owned(),
            device_type: device_type.to_owned(),
            signals: Mutex::new(signals),
        }
    }

    /// Overwrites a signal, as a sensor update would.
    pub fn set_state(&self, signal: &str, value: f64) {
        let _ = self.signals.lock().unwrap_or_else(PoisonError::into_inner).insert(signal.to_owned(), value);
    }
}

impl Device for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn get_state(&self, signal: &str) -> Result<f64> {
        let signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        signals.get(signal).cloned().ok_or_else(|| Error::UnknownSignal(format!("{}/{}", self.id, signal)))
    }

    fn set_command(&self, signal: &str, value: f64) -> Result<()> {
        debug!("{} <- {} = {}", self.id, signal, value);
        let _ = self.signals.lock().unwrap_or_else(PoisonError::into_inner).insert(signal.to_owned(), value);
        Ok(())
    }
}

/// Devices indexed by type, then by id.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, BTreeMap<String, Arc<dyn Device>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    /// Registers a device, replacing any device of the same type and id.
    pub fn register(&self, device: Arc<dyn Device>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let by_id = devices.entry(device.device_type().to_owned()).or_insert_with(BTreeMap::new);
        let _ = by_id.insert(device.id().to_owned(), device);
    }

    pub fn remove(&self, device_type: &str, id: &str) -> Option<Arc<dyn Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.get_mut(device_type).and_then(|by_id| by_id.remove(id))
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).values().map(|by_id| by_id.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceLayer for DeviceRegistry {
    fn devices_of_type(&self, device_type: &str) -> Vec<Arc<dyn Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        match devices.get(device_type) {
            Some(by_id) => by_id.values().cloned().collect(),
            None => vec![],
        }
    }
}
