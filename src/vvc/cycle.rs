use crate::mailbox::GradientMailbox;
use crate::message::MessageBuilder;
use crate::peers::PeerDirectory;
use crate::round::RoundTask;
use crate::server::ControlSettings;
use crate::telemetry::{ActuatorCommand, TelemetryBridge};
use crate::transport::PeerTransport;

use crate::colored::Colorize;
use tracing::{debug, error, info, warn};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Grid totals read at the start of every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTotals {
    pub generation: f64,
    pub storage: f64,
    pub load: f64,
    pub gateway: f64,
}

impl GridTotals {
    pub fn net_generation(&self) -> f64 {
        self.generation + self.storage - self.load
    }
}

/// Where the gradient applied in a round came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientSource {
    /// Nothing has been delivered yet; the neutral vector was applied.
    Neutral,
    /// A vector not applied in any earlier round.
    Fresh(u64),
    /// The same vector as an earlier round.
    Reused(u64),
}

/// What one round did.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub totals: GridTotals,
    pub advisories_sent: usize,
    /// The reading sent to the coordinator, if it was valid.
    pub reported: Option<f64>,
    pub gradient: GradientSource,
    /// The command applied per actuator slot, with the number of devices that accepted it.
    pub commands: Vec<(f64, usize)>,
}

/// One volt-var round: broadcast, sense, report, consume and actuate.
pub struct ControlCycle {
    settings: ControlSettings,
    peers: Arc<PeerDirectory>,
    mailbox: Arc<GradientMailbox>,
    telemetry: TelemetryBridge,
    transport: Arc<dyn PeerTransport>,
    builder: MessageBuilder,
    last_applied: AtomicU64,
}

impl ControlCycle {
    pub fn new(
        settings: ControlSettings,
        peers: Arc<PeerDirectory>,
        mailbox: Arc<GradientMailbox>,
        telemetry: TelemetryBridge,
        transport: Arc<dyn PeerTransport>,
        builder: MessageBuilder,
    ) -> Self {
        ControlCycle { settings, peers, mailbox, telemetry, transport, builder, last_applied: AtomicU64::new(0) }
    }

    pub fn run(&self) -> RoundReport {
        let totals = self.read_totals();
        let advisories_sent = self.broadcast_advisory();
        let reported = self.report_reading();
        let (gradient, values) = self.consume_gradient();
        let commands = self.actuate(&values);
        RoundReport { totals, advisories_sent, reported, gradient, commands }
    }

    fn read_totals(&self) -> GridTotals {
        let totals = &self.settings.totals;
        let grid = GridTotals {
            generation: self.telemetry.read_aggregate(&totals.generation.device_type, &totals.generation.signal),
            storage: self.telemetry.read_aggregate(&totals.storage.device_type, &totals.storage.signal),
            load: self.telemetry.read_aggregate(&totals.load.device_type, &totals.load.signal),
            gateway: self.telemetry.read_aggregate(&totals.gateway.device_type, &totals.gateway.signal),
        };
        info!(
            "[{}] net generation = {}, gateway = {}",
            self.builder.sender().cyan(),
            grid.net_generation(),
            grid.gateway
        );
        grid
    }

    fn broadcast_advisory(&self) -> usize {
        let advisory = &self.settings.advisory;
        let envelope = match self.builder.voltage_delta(
            advisory.control_factor,
            advisory.phase_measurement,
            &advisory.reading_location,
        ) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("couldn't encode voltage delta: {}", err);
                return 0;
            }
        };
        let peers = self.peers.snapshot();
        for peer in peers.iter() {
            debug!("voltage delta -> {} ({})", peer.id, peer.address);
            self.transport.send(&peer.address, envelope.clone());
        }
        peers.len()
    }

    fn report_reading(&self) -> Option<f64> {
        let measurement = &self.settings.measurement;
        let reading = self.telemetry.read_single(&measurement.device_type, &measurement.signal);
        match reading {
            Some(value) if value > self.settings.validity_floor => {
                let seed = vec![value; self.settings.actuator_slots.len()];
                match self.builder.gradient(seed) {
                    Ok(envelope) => {
                        debug!("gradient seed {} -> {}", value, self.settings.coordinator_address);
                        self.transport.send(&self.settings.coordinator_address, envelope);
                        Some(value)
                    }
                    Err(err) => {
                        error!("couldn't encode gradient: {}", err);
                        None
                    }
                }
            }
            Some(value) => {
                info!(
                    "[{}] reading {} at or below {}, not reported",
                    self.builder.sender().cyan(),
                    value,
                    self.settings.validity_floor
                );
                None
            }
            None => {
                info!("[{}] no valid reading, not reported", self.builder.sender().cyan());
                None
            }
        }
    }

    fn consume_gradient(&self) -> (GradientSource, Vec<f64>) {
        let slots = self.settings.actuator_slots.len();
        let stamped = match self.mailbox.take_latest() {
            Some(stamped) => stamped,
            None => return (GradientSource::Neutral, vec![0.0; slots]),
        };
        let previous = self.last_applied.swap(stamped.seq, Ordering::SeqCst);
        let source = if previous == stamped.seq {
            warn!("applying gradient {} again, nothing newer was delivered", stamped.seq);
            GradientSource::Reused(stamped.seq)
        } else {
            GradientSource::Fresh(stamped.seq)
        };
        let values = (0..slots)
            .map(|slot| match stamped.vector.component(slot) {
                Some(value) => value,
                None => {
                    warn!("gradient {} has no component for slot {}", stamped.seq, slot);
                    0.0
                }
            })
            .collect();
        (source, values)
    }

    fn actuate(&self, values: &[f64]) -> Vec<(f64, usize)> {
        self.settings
            .actuator_slots
            .iter()
            .zip(values.iter())
            .map(|(device_type, value)| {
                let command = ActuatorCommand::new(device_type, &self.settings.command_signal, *value);
                (*value, self.telemetry.apply_command(&command))
            })
            .collect()
    }
}

impl RoundTask for ControlCycle {
    fn run_round(&self) {
        let report = self.run();
        debug!("{:?}", report);
    }
}
