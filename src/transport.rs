use crate::client::{Client, Deliver};
use crate::message::Envelope;

use actix::Addr;
use tokio::time::Duration;

/// Sends envelopes to peers identified by an opaque `host:port` address.
/// Delivery is best effort; failures are logged by the transport.
pub trait PeerTransport: Send + Sync {
    fn send(&self, address: &str, envelope: Envelope);
}

/// Delivers each envelope over its own TCP connection, bounded by the request timeout.
pub struct TcpTransport {
    client: Addr<Client>,
    request_timeout: Duration,
}

impl TcpTransport {
    pub fn new(client: Addr<Client>, request_timeout: Duration) -> Self {
        TcpTransport { client, request_timeout }
    }
}

impl PeerTransport for TcpTransport {
    fn send(&self, address: &str, envelope: Envelope) {
        self.client.do_send(Deliver {
            address: address.to_owned(),
            envelope,
            delta: self.request_timeout,
        });
    }
}
