//! Volt-var and group management message definitions.
//!
//! Every message travels inside an [`Envelope`] carrying two discriminants: the
//! message category and the variant within that category. The payload itself is
//! an opaque bincode body, so an envelope produced by a newer peer always parses
//! and an unknown tag combination surfaces as [`Decoded::Unrecognized`] instead
//! of a decoding failure.
mod builder;
mod group;
mod volt_var;

pub use builder::MessageBuilder;
pub use group::{GroupManagementMessage, PeerEntry, PeerList};
pub use volt_var::{Gradient, LineReadings, VoltVarMessage, VoltageDelta};

use crate::Result;

/// The module tag used by the volt-var agent on a multiplexed transport.
pub const VVC_MODULE: &str = "vvc";

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleMessage {
    VoltVar(VoltVarMessage),
    GroupManagement(GroupManagementMessage),
}

impl ModuleMessage {
    pub const VOLT_VAR: u16 = 1;
    pub const GROUP_MANAGEMENT: u16 = 2;

    pub fn category(&self) -> u16 {
        match self {
            ModuleMessage::VoltVar(_) => Self::VOLT_VAR,
            ModuleMessage::GroupManagement(_) => Self::GROUP_MANAGEMENT,
        }
    }

    pub fn variant(&self) -> u16 {
        match self {
            ModuleMessage::VoltVar(m) => m.variant(),
            ModuleMessage::GroupManagement(m) => m.variant(),
        }
    }
}

/// Outcome of opening an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(ModuleMessage),
    Unrecognized { category: u16, variant: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifier of the sending node.
    pub sender: String,
    /// The local agent this envelope is routed to.
    pub recipient_module: String,
    pub category: u16,
    pub variant: u16,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn wrap(sender: &str, recipient_module: &str, message: &ModuleMessage) -> Result<Self> {
        let body = match message {
            ModuleMessage::VoltVar(m) => m.encode_body()?,
            ModuleMessage::GroupManagement(m) => m.encode_body()?,
        };
        Ok(Envelope {
            sender: sender.to_owned(),
            recipient_module: recipient_module.to_owned(),
            category: message.category(),
            variant: message.variant(),
            body,
        })
    }

    pub fn open(&self) -> Result<Decoded> {
        let decoded = match self.category {
            ModuleMessage::VOLT_VAR => VoltVarMessage::decode_body(self.variant, &self.body)?
                .map(ModuleMessage::VoltVar),
            ModuleMessage::GROUP_MANAGEMENT => {
                GroupManagementMessage::decode_body(self.variant, &self.body)?
                    .map(ModuleMessage::GroupManagement)
            }
            _ => None,
        };
        Ok(match decoded {
            Some(message) => Decoded::Message(message),
            None => Decoded::Unrecognized { category: self.category, variant: self.variant },
        })
    }
}
