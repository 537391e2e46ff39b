use super::{
    Envelope, Gradient, GroupManagementMessage, LineReadings, ModuleMessage, PeerEntry, PeerList,
    VoltVarMessage, VoltageDelta,
};
use crate::Result;

/// Wraps outbound payloads into envelopes stamped with this node's id and the
/// destination module.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    sender: String,
    recipient_module: String,
}

impl MessageBuilder {
    pub fn new(sender: &str, recipient_module: &str) -> Self {
        MessageBuilder { sender: sender.to_owned(), recipient_module: recipient_module.to_owned() }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    fn prepare(&self, message: ModuleMessage) -> Result<Envelope> {
        Envelope::wrap(&self.sender, &self.recipient_module, &message)
    }

    pub fn voltage_delta(&self, control_factor: u32, phase_measurement: f64, reading_location: &str) -> Result<Envelope> {
        self.prepare(ModuleMessage::VoltVar(VoltVarMessage::VoltageDelta(VoltageDelta {
            control_factor,
            phase_measurement,
            reading_location: reading_location.to_owned(),
        })))
    }

    pub fn line_readings(&self, measurements: Vec<f64>) -> Result<Envelope> {
        self.prepare(ModuleMessage::VoltVar(VoltVarMessage::LineReadings(LineReadings::new(measurements))))
    }

    pub fn gradient(&self, values: Vec<f64>) -> Result<Envelope> {
        self.prepare(ModuleMessage::VoltVar(VoltVarMessage::Gradient(Gradient::new(values))))
    }

    pub fn peer_list(&self, peers: Vec<PeerEntry>) -> Result<Envelope> {
        self.prepare(ModuleMessage::GroupManagement(GroupManagementMessage::PeerList(PeerList { peers })))
    }
}
