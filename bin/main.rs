use tracing::{error, info};
use tracing_subscriber;

use clap::{value_t, App, Arg};

use vvc_agent::server::{node, Settings};
use vvc_agent::Result;

fn main() -> Result<()> {
    let matches = App::new("vvc-node")
        .version("0.1")
        .about("Runs a volt-var control agent")
        .arg(
            Arg::with_name("settings")
                .short("s")
                .long("settings")
                .value_name("SETTINGS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listener-ip")
                .short("a")
                .long("listener-ip")
                .value_name("LISTENER_IP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("node-id")
                .short("i")
                .long("node-id")
                .value_name("NODE_ID")
                .takes_value(true),
        )
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Logs at debug level"))
        .get_matches();

    let level = if matches.is_present("verbose") { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(level)
        .init();

    let mut settings = match matches.value_of("settings") {
        Some(path) => Settings::load(path)?,
        None => Settings::new()?,
    };
    if matches.is_present("listener-ip") {
        settings.listener_ip =
            value_t!(matches.value_of("listener-ip"), String).unwrap_or_else(|e| e.exit());
    }
    if matches.is_present("node-id") {
        settings.node_id = value_t!(matches.value_of("node-id"), String).unwrap_or_else(|e| e.exit());
    }

    let sys = actix::System::new();
    sys.block_on(serve(settings))?;
    sys.run()?;

    Ok(())
}

/// Runs the node until a signal arrives or the scheduler reports a fault.
async fn serve(settings: Settings) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let node = node::run(settings, tx).await?;
    info!(target: "vvc", "listening on {}", node.local_addr);

    let stop: Result<&str> = if cfg!(unix) {
        use futures::future::FutureExt;
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        futures::select! {
            _ = sigint.recv().fuse() => Ok("SIGINT"),
            _ = sigterm.recv().fuse() => Ok("SIGTERM"),
            fatal = rx.recv().fuse() => match fatal {
                Some(err) => Err(err),
                None => Ok("supervisor closed"),
            },
        }
    } else {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "Ctrl+C").map_err(From::from),
            fatal = rx.recv() => match fatal {
                Some(err) => Err(err),
                None => Ok("supervisor closed"),
            },
        }
    };
    match &stop {
        Ok(sig) => info!(target: "vvc", "Got {}, stopping...", sig),
        Err(err) => error!(target: "vvc", "fatal: {}, stopping...", err),
    }

    node.shutdown();
    actix::System::current().stop();
    stop.map(|_| ())
}
