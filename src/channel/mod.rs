//! Length-delimited bincode framing over TCP.
mod framed;

pub use framed::{Inbound, Outbound};
