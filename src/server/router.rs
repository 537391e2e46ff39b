use crate::mailbox::{GradientMailbox, GradientVector};
use crate::message::{Decoded, Envelope, GroupManagementMessage, ModuleMessage, VoltVarMessage};
use crate::peers::PeerDirectory;
use crate::Result;

use crate::colored::Colorize;
use tracing::{debug, info, warn};

use actix::{Actor, Context, Handler};

use std::sync::Arc;

/// What the router did with an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// The peer set was replaced with this many peers.
    PeerList { peers: usize },
    /// A gradient was published under this sequence number.
    Gradient { seq: u64 },
    VoltageDelta,
    LineReadings,
    Dropped,
}

/// Decodes inbound envelopes and applies them to the shared peer directory and
/// gradient mailbox.
pub struct Router {
    module: String,
    peers: Arc<PeerDirectory>,
    mailbox: Arc<GradientMailbox>,
}

impl Router {
    pub fn new(module: &str, peers: Arc<PeerDirectory>, mailbox: Arc<GradientMailbox>) -> Self {
        Router { module: module.to_owned(), peers, mailbox }
    }

    pub fn dispatch(&self, envelope: &Envelope) -> Result<Routed> {
        if envelope.recipient_module != self.module {
            warn!(
                "[{}] dropping envelope from {} addressed to {}",
                self.module.cyan(),
                envelope.sender,
                envelope.recipient_module
            );
            return Ok(Routed::Dropped);
        }
        match envelope.open()? {
            Decoded::Message(ModuleMessage::VoltVar(VoltVarMessage::VoltageDelta(delta))) => {
                info!(
                    "[{}] voltage delta from {}: factor = {}, phase = {}, location = {}",
                    self.module.cyan(),
                    envelope.sender,
                    delta.control_factor,
                    delta.phase_measurement,
                    delta.reading_location
                );
                Ok(Routed::VoltageDelta)
            }
            Decoded::Message(ModuleMessage::VoltVar(VoltVarMessage::LineReadings(readings))) => {
                info!(
                    "[{}] line readings from {} at {:?}: {:?}",
                    self.module.cyan(),
                    envelope.sender,
                    readings.capture_time,
                    readings.measurements
                );
                Ok(Routed::LineReadings)
            }
            Decoded::Message(ModuleMessage::VoltVar(VoltVarMessage::Gradient(gradient))) => {
                debug!("[{}] gradient from {}: {:?}", self.module.cyan(), envelope.sender, gradient.values);
                let seq = self.mailbox.publish(GradientVector::from(gradient));
                Ok(Routed::Gradient { seq })
            }
            Decoded::Message(ModuleMessage::GroupManagement(GroupManagementMessage::PeerList(list))) => {
                let peers = list.peers.len();
                self.peers.apply_membership_update(list.peers, &envelope.sender);
                info!("[{}] {} peers, leader = {}", self.module.cyan(), peers, envelope.sender);
                Ok(Routed::PeerList { peers })
            }
            Decoded::Unrecognized { category, variant } => {
                warn!(
                    "[{}] unrecognized message {}/{} from {}",
                    self.module.cyan(),
                    category,
                    variant,
                    envelope.sender
                );
                Ok(Routed::Dropped)
            }
        }
    }
}

impl Actor for Router {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("router> started");
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<Routed>")]
pub struct Deliver {
    pub envelope: Envelope,
}

impl Handler<Deliver> for Router {
    type Result = Result<Routed>;

    fn handle(&mut self, msg: Deliver, _ctx: &mut Context<Self>) -> Self::Result {
        self.dispatch(&msg.envelope)
    }
}
