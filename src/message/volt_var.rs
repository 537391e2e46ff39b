use tai64::Tai64N;

/// Advisory broadcast sent to every peer once per round. Not accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageDelta {
    pub control_factor: u32,
    pub phase_measurement: f64,
    pub reading_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineReadings {
    pub measurements: Vec<f64>,
    pub capture_time: Tai64N,
}

impl LineReadings {
    pub fn new(measurements: Vec<f64>) -> Self {
        LineReadings { measurements, capture_time: Tai64N::now() }
    }
}

/// A correction vector; component `i` belongs to actuator slot `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub values: Vec<f64>,
    pub capture_time: Tai64N,
}

impl Gradient {
    pub fn new(values: Vec<f64>) -> Self {
        Gradient { values, capture_time: Tai64N::now() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoltVarMessage {
    VoltageDelta(VoltageDelta),
    LineReadings(LineReadings),
    Gradient(Gradient),
}

impl VoltVarMessage {
    pub const VOLTAGE_DELTA: u16 = 1;
    pub const LINE_READINGS: u16 = 2;
    pub const GRADIENT: u16 = 3;

    pub fn variant(&self) -> u16 {
        match self {
            VoltVarMessage::VoltageDelta(_) => Self::VOLTAGE_DELTA,
            VoltVarMessage::LineReadings(_) => Self::LINE_READINGS,
            VoltVarMessage::Gradient(_) => Self::GRADIENT,
        }
    }

    pub(super) fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        match self {
            VoltVarMessage::VoltageDelta(m) => bincode::serialize(m),
            VoltVarMessage::LineReadings(m) => bincode::serialize(m),
            VoltVarMessage::Gradient(m) => bincode::serialize(m),
        }
    }

    /// Returns `Ok(None)` for a variant this build does not know.
    pub(super) fn decode_body(variant: u16, body: &[u8]) -> bincode::Result<Option<Self>> {
        let message = match variant {
            Self::VOLTAGE_DELTA => VoltVarMessage::VoltageDelta(bincode::deserialize(body)?),
            Self::LINE_READINGS => VoltVarMessage::LineReadings(bincode::deserialize(body)?),
            Self::GRADIENT => VoltVarMessage::Gradient(bincode::deserialize(body)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}
