//! Gateway: the client-facing API over the office engine.
//!
//! Translates tokens to sessions, applies per-session throttling and opens
//! the page's initial panels. It holds no room state of its own.

use std::sync::Arc;

use odooxr_common::{ClientMode, Event, OfficeError, PanelId, RoomId, SessionId, UserIdentity};
use odooxr_config::schema::GatewayConfig;
use odooxr_office::{ClientDelta, Delta, Office, ResourcePanel, Subscription};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::PanelRequest;
use crate::rate_limit::RateLimiter;

/// A successful join as seen by the portal.
pub struct Joined {
    pub token: SessionId,
    pub room: RoomId,
    pub subscription: Subscription,
    /// Initial panels this join opened. Panels that were already open in
    /// the room are not listed.
    pub opened: Vec<PanelId>,
}

pub struct Gateway {
    office: Arc<Office>,
    limiter: RateLimiter,
}

/// Client tokens are session ids. Anything unparseable is an expired
/// session as far as the client is concerned.
pub fn parse_token(token: &str) -> Result<SessionId, OfficeError> {
    SessionId::parse(token).ok_or_else(|| OfficeError::expired(token))
}

impl Gateway {
    pub fn new(office: Arc<Office>, config: &GatewayConfig) -> Self {
        Self {
            office,
            limiter: RateLimiter::from_config(config),
        }
    }

    pub fn office(&self) -> &Arc<Office> {
        &self.office
    }

    pub async fn join(
        &self,
        room: RoomId,
        user: UserIdentity,
        mode: ClientMode,
        resources: Vec<PanelRequest>,
    ) -> Result<Joined, OfficeError> {
        let ticket = self.office.join(room, user, mode).await?;

        let mut opened = Vec::new();
        for request in resources {
            let delta = ClientDelta::OpenPanel {
                panel: request.panel.clone(),
                resource: request.resource.clone(),
            };
            match self.office.submit(&ticket.session, delta).await {
                Ok(_) => opened.push(request.panel),
                Err(OfficeError::Conflict { .. }) => {
                    debug!(panel = %request.panel, "Initial panel already open");
                }
                Err(err) => {
                    warn!(
                        session = %ticket.session,
                        panel = %request.panel,
                        resource = %request.resource,
                        error = %err,
                        "Could not open initial panel"
                    );
                }
            }
        }

        Ok(Joined {
            token: ticket.session,
            room: ticket.room,
            subscription: ticket.subscription,
            opened,
        })
    }

    pub async fn resume(&self, token: &str) -> Result<(SessionId, Subscription), OfficeError> {
        let session = parse_token(token)?;
        let subscription = self.office.resume(&session).await?;
        Ok((session, subscription))
    }

    pub async fn subscribe(&self, token: &SessionId) -> Result<Subscription, OfficeError> {
        self.office.subscribe(token).await
    }

    pub async fn submit(&self, token: &SessionId, delta: ClientDelta) -> Result<Delta, OfficeError> {
        self.limiter.check(token)?;
        self.office.submit(token, delta).await
    }

    pub async fn hydrate(
        &self,
        token: &SessionId,
        panel: &PanelId,
    ) -> Result<ResourcePanel, OfficeError> {
        self.limiter.check(token)?;
        self.office.hydrate(token, panel).await
    }

    pub async fn heartbeat(&self, token: &SessionId) -> Result<(), OfficeError> {
        self.office.heartbeat(token).await
    }

    pub async fn leave(&self, token: &SessionId) -> Result<(), OfficeError> {
        self.limiter.forget(token);
        self.office.leave(token).await
    }

    /// Socket closed without a leave: cancel in-flight work, keep the
    /// session resumable.
    pub async fn disconnect(&self, token: &SessionId) {
        if self.office.disconnect(token).await {
            debug!(session = %token, "Session disconnected");
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Drop the throttling state of sessions the office has closed, however
    /// they ended (timeout, replacement, leave).
    pub fn spawn_bucket_janitor(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.office.events().subscribe();
        let gateway = self.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(Event::SessionClosed { session, .. }) => gateway.limiter.forget(&session),
                    Ok(Event::Shutdown) | Err(RecvError::Closed) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        let pruned = gateway.limiter.prune_idle();
                        debug!(missed, pruned, "Bucket janitor lagged");
                    }
                }
            }
        })
    }
}
