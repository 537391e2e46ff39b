use super::router::{Deliver, Router};
use crate::channel::Inbound;
use crate::message::Envelope;
use crate::Result;
use tracing::{debug, error, info, warn};

use actix::Addr;

use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Accepts peer connections and feeds every inbound envelope to the router.
pub struct Server {
    listener: TcpListener,
    /// The address of the router.
    router: Addr<Router>,
}

impl Server {
    pub async fn bind(ip: &str, router: Addr<Router>) -> Result<Server> {
        let listener = TcpListener::bind(ip).await?;
        Ok(Server { listener, router })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn listen(self) -> Result<()> {
        info!("listening on {:?}", self.listener.local_addr()?);
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let router = self.router.clone();
            let _ = tokio::spawn(async move {
                let mut inbound: Inbound<Envelope> = Inbound::wrap(socket, peer);
                loop {
                    match inbound.recv().await {
                        Ok(Some(envelope)) => match router.send(Deliver { envelope }).await {
                            Ok(Ok(routed)) => debug!("{:?} <- {}", routed, inbound.peer()),
                            Ok(Err(err)) => warn!("dropping envelope from {}: {}", inbound.peer(), err),
                            Err(err) => {
                                error!("router unavailable: {}", err);
                                break;
                            }
                        },
                        Ok(None) => break,
                        Err(err) => {
                            warn!("connection from {} failed: {}", inbound.peer(), err);
                            break;
                        }
                    }
                }
            });
        }
    }
}
