use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::Client;
use crate::mailbox::GradientMailbox;
use crate::message::MessageBuilder;
use crate::peers::PeerDirectory;
use crate::round::{Broker, BrokerHandle, Phase, RoundController};
use crate::server::{Router, Server, Settings};
use crate::telemetry::{DeviceRegistry, SimulatedDevice, TelemetryBridge};
use crate::transport::TcpTransport;
use crate::vvc::ControlCycle;
use crate::{Error, Result};
use actix::{Actor, Arbiter};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tracing::{error, info};

/// A running volt-var node. Dropping it leaves everything running; call
/// [`Node::shutdown`] to stop.
pub struct Node {
    pub local_addr: SocketAddr,
    pub peers: Arc<PeerDirectory>,
    pub mailbox: Arc<GradientMailbox>,
    pub devices: Arc<DeviceRegistry>,
    controller: RoundController,
    broker: BrokerHandle,
    arbiter: Arbiter,
}

impl Node {
    pub fn rounds(&self) -> u64 {
        self.controller.rounds()
    }

    pub fn shutdown(self) {
        info!("Node is stopping");
        self.controller.stop();
        self.broker.shutdown();
        let _ = self.arbiter.stop();
    }
}

fn device_registry(settings: &Settings) -> Arc<DeviceRegistry> {
    let registry = Arc::new(DeviceRegistry::new());
    for device in settings.devices.iter() {
        registry.register(Arc::new(SimulatedDevice::new(
            &device.id,
            &device.device_type,
            device.initial_signals(),
        )));
    }
    registry
}

/// Wires up and starts a node. Must be called from within a running actix system.
/// Scheduler faults are sent to `supervisor`.
pub async fn run(settings: Settings, supervisor: UnboundedSender<Error>) -> Result<Node> {
    settings.validate()?;
    info!("Node {} is starting", settings.node_id);

    let peers = Arc::new(PeerDirectory::new());
    let mailbox = Arc::new(GradientMailbox::new());
    let devices = device_registry(&settings);
    info!("registered {} devices", devices.len());

    // Create the 'client' actor
    let client_addr = Client::new().start();
    let transport = Arc::new(TcpTransport::new(client_addr, settings.request_timeout()));

    // Inbound traffic is handled on its own arbiter, apart from the rounds
    let arbiter = Arbiter::new();
    let router = Router::new(&settings.module, peers.clone(), mailbox.clone());
    let router_addr = Router::start_in_arbiter(&arbiter.handle(), move |_| router);
    let server = Server::bind(&settings.listener_ip, router_addr).await?;
    let local_addr = server.local_addr()?;
    let _ = arbiter.spawn(async move {
        if let Err(err) = server.listen().await {
            error!("server stopped: {}", err);
        }
    });

    let phases = settings
        .phases
        .iter()
        .map(|phase| Phase::new(&phase.module, Duration::from_millis(phase.duration_ms)))
        .collect();
    let broker = Broker::launch(phases, supervisor)?;

    let cycle = ControlCycle::new(
        settings.control.clone(),
        peers.clone(),
        mailbox.clone(),
        TelemetryBridge::new(devices.clone()),
        transport,
        MessageBuilder::new(&settings.node_id, &settings.module),
    );
    let controller =
        RoundController::new(&settings.module, Arc::new(broker.clone()), Arc::new(cycle), settings.round_time());
    controller.start();

    Ok(Node { local_addr, peers, mailbox, devices, controller, broker, arbiter })
}
