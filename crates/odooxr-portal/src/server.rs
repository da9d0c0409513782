//! Accept loop and the background reaper.

use std::sync::Arc;
use std::time::Duration;

use odooxr_config::OfficeConfig;
use odooxr_office::Office;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;

use crate::connection::{handle_connection, ConnectionSettings};
use crate::gateway::Gateway;

#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub connection: ConnectionSettings,
    pub sweep_interval: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &OfficeConfig) -> Self {
        Self {
            connection: ConnectionSettings {
                hello_timeout: config.gateway.hello_timeout(),
                outbound_buffer: config.gateway.outbound_buffer as usize,
            },
            sweep_interval: config.presence.sweep_interval(),
        }
    }
}

/// Periodically age sessions and tear down empty rooms.
pub fn spawn_reaper(
    office: Arc<Office>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = office.sweep().await;
                    if report.is_empty() {
                        continue;
                    }
                    tracing::debug!(
                        stale = report.stale.len(),
                        timed_out = report.timed_out.len(),
                        torn_down = report.torn_down.len(),
                        "Reaper tick"
                    );
                }
            }
        }
    })
}

/// Serve WebSocket clients on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    settings: ServerSettings,
    shutdown: CancellationToken,
) {
    let reaper = spawn_reaper(
        gateway.office().clone(),
        settings.sweep_interval,
        shutdown.clone(),
    );
    let janitor = gateway.spawn_bucket_janitor(shutdown.clone());

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let gateway = gateway.clone();
                let connection = settings.connection;
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, gateway, connection).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }

    let _ = reaper.await;
    let _ = janitor.await;
    tracing::info!("Server stopped");
}
