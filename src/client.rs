use crate::channel::Outbound;
use crate::message::Envelope;
use crate::{Error, Result};
use tracing::{debug, warn};

use actix::{Actor, Context, Handler, ResponseFuture};
use tokio::time::{timeout, Duration};

pub struct Client;

impl Client {
    pub fn new() -> Client {
        Client {}
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Actor for Client {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("started client");
    }
}

/// Delivers a single envelope to a peer. Nothing is expected back.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<()>")]
pub struct Deliver {
    pub address: String,
    pub envelope: Envelope,
    pub delta: Duration,
}

impl Handler<Deliver> for Client {
    type Result = ResponseFuture<Result<()>>;

    fn handle(&mut self, msg: Deliver, _ctx: &mut Context<Self>) -> Self::Result {
        Box::pin(async move {
            let Deliver { address, envelope, delta } = msg;
            let result = deliver(&address, envelope, delta).await;
            if let Err(err) = &result {
                warn!("delivery to {} failed: {}", address, err);
            }
            result
        })
    }
}

/// Connects, sends one envelope and closes, all within `delta`.
pub async fn deliver(address: &str, envelope: Envelope, delta: Duration) -> Result<()> {
    let execution = async {
        let mut outbound: Outbound<Envelope> = Outbound::connect(address).await?;
        outbound.send(envelope).await?;
        outbound.close().await?;
        Ok(())
    };
    match timeout(delta, execution).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}
