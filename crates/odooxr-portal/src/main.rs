//! odooxr-portal binary: load config, build the office over the configured
//! host and serve WebSocket clients until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use odooxr_common::{Event, XrError};
use odooxr_config::OfficeConfig;
use odooxr_office::{HostSystem, MemoryHost, Office};
use odooxr_portal::{serve, Gateway, ServerSettings};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "odooxr-portal", about = "Shared XR office gateway for the host portal")]
struct Args {
    /// Config file. Defaults to <config dir>/odooxr/config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding gateway.bind.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overriding gateway.port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Tracing filter, e.g. "debug" or "odooxr_office=trace".
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(args: &Args, config: &OfficeConfig) {
    let fallback = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.directive());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

fn build_host(config: &OfficeConfig) -> Arc<dyn HostSystem> {
    if config.host.demo_data {
        Arc::new(MemoryHost::demo())
    } else {
        Arc::new(MemoryHost::new(config.host.default_groups.iter().cloned()))
    }
}

/// Mirror lifecycle events into the log.
fn spawn_event_logger(office: &Office) {
    let mut rx = office.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                Event::Shutdown => break,
                Event::RoomCreated(room) => tracing::info!(room = %room, "Room created"),
                Event::RoomTornDown(room) => tracing::info!(room = %room, "Room torn down"),
                other => tracing::debug!(event = ?other, "Office event"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), XrError> {
    let args = Args::parse();

    let mut config = odooxr_config::load_config(args.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.gateway.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    init_tracing(&args, &config);

    let office = Arc::new(Office::new(&config, build_host(&config)));
    spawn_event_logger(&office);
    let gateway = Arc::new(Gateway::new(office.clone(), &config.gateway));

    let addr = config.gateway.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        demo_data = config.host.demo_data,
        "odooxr-portal listening"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down");
                signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    serve(
        listener,
        gateway,
        ServerSettings::from_config(&config),
        shutdown,
    )
    .await;
    office.events().publish(Event::Shutdown);
    Ok(())
}
