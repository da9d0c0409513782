//! The office engine: presence registry, room synchronizer and resource
//! bridge wired together behind session-level operations.

use std::sync::Arc;

use odooxr_common::{
    ClientMode, EventBus, LeaveReason, OfficeError, PanelId, RoomId, SessionId, UserIdentity,
};
use odooxr_config::OfficeConfig;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::bridge::{HostSystem, ResourceBridge};
use crate::presence::{MembershipChange, PresenceRegistry, Session};
use crate::protocol::{ClientDelta, Delta, MemberInfo, ResourcePanel, RoomSnapshot};
use crate::sync::{Subscription, SyncSettings, Synchronizer};

/// Result of a successful join.
pub struct JoinTicket {
    /// Also the opaque token the client resumes with.
    pub session: SessionId,
    pub room: RoomId,
    /// Starts with a snapshot that already includes the new member.
    pub subscription: Subscription,
}

/// What a sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub stale: Vec<SessionId>,
    pub timed_out: Vec<SessionId>,
    pub torn_down: Vec<RoomId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.timed_out.is_empty() && self.torn_down.is_empty()
    }
}

pub struct Office {
    registry: PresenceRegistry,
    sync: Synchronizer,
    bridge: Arc<ResourceBridge>,
    events: EventBus,
}

impl Office {
    pub fn new(config: &OfficeConfig, host: Arc<dyn HostSystem>) -> Self {
        let events = EventBus::default();
        let bridge = Arc::new(ResourceBridge::from_config(host, &config.bridge));
        Self {
            registry: PresenceRegistry::from_config(&config.presence, events.clone()),
            sync: Synchronizer::new(
                bridge.clone(),
                SyncSettings::from_config(config),
                events.clone(),
            ),
            bridge,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn bridge(&self) -> &ResourceBridge {
        &self.bridge
    }

    pub async fn session(&self, id: &SessionId) -> Option<Session> {
        self.registry.get(id).await
    }

    async fn apply_changes(&self, changes: Vec<MembershipChange>) {
        for change in changes {
            if let MembershipChange::Left {
                session,
                room,
                reason,
            } = change
            {
                self.sync.remove(&room, &session, reason).await;
            }
        }
    }

    /// Heartbeat-equivalent used by every session operation.
    async fn touch(&self, id: &SessionId) -> Result<Session, OfficeError> {
        self.registry.heartbeat(id).await?;
        self.registry
            .get(id)
            .await
            .ok_or_else(|| OfficeError::expired(id))
    }

    /// Join `room` as `user`. A previous session of the same user is
    /// replaced.
    pub async fn join(
        &self,
        room: RoomId,
        user: UserIdentity,
        mode: ClientMode,
    ) -> Result<JoinTicket, OfficeError> {
        if room.as_str().trim().is_empty() {
            return Err(OfficeError::invalid_room(&room));
        }
        let scope = self.bridge.scope_for(&user).await?;

        let (session, replaced) = self
            .registry
            .register(user, room.clone(), mode, scope)
            .await;
        self.apply_changes(replaced).await;

        self.enter(session).await
    }

    /// Put a registered session into its room and mark it active.
    async fn enter(&self, session: Session) -> Result<JoinTicket, OfficeError> {
        let room = session.room.clone();
        let mode = session.mode;
        let member = MemberInfo::new(session.id.clone(), session.user.clone(), mode);
        let subscription = match self.sync.admit(&room, member).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(room = %room, error = %err, "Join refused");
                self.registry.discard(&session.id).await;
                return Err(err);
            }
        };

        // A newer join by the same user may have replaced this session
        // before it reached the room. Its member must not outlive it.
        if let Err(err) = self.registry.activate(&session.id).await {
            info!(session = %session.id, room = %room, "Session replaced while joining");
            self.sync
                .remove(&room, &session.id, LeaveReason::Replaced)
                .await;
            return Err(err);
        }

        info!(
            session = %session.id,
            room = %room,
            user = %session.user.user_id,
            mode = ?mode,
            "Session joined"
        );
        Ok(JoinTicket {
            session: session.id,
            room,
            subscription,
        })
    }

    /// Reattach to a session that is still alive (reconnect).
    pub async fn resume(&self, id: &SessionId) -> Result<Subscription, OfficeError> {
        let session = self.touch(id).await?;
        info!(session = %id, room = %session.room, "Session resumed");
        self.sync.subscribe(&session.room, id).await
    }

    pub async fn subscribe(&self, id: &SessionId) -> Result<Subscription, OfficeError> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| OfficeError::expired(id))?;
        self.sync.subscribe(&session.room, id).await
    }

    pub async fn heartbeat(&self, id: &SessionId) -> Result<(), OfficeError> {
        self.registry.heartbeat(id).await.map(|_| ())
    }

    /// Submit a delta on behalf of `id`. Counts as a heartbeat.
    pub async fn submit(&self, id: &SessionId, delta: ClientDelta) -> Result<Delta, OfficeError> {
        let session = self.touch(id).await?;
        self.sync
            .submit(&session.room, id, &session.scope, delta, &session.cancel)
            .await
    }

    pub async fn hydrate(
        &self,
        id: &SessionId,
        panel: &PanelId,
    ) -> Result<ResourcePanel, OfficeError> {
        let session = self.touch(id).await?;
        self.sync
            .hydrate(&session.room, id, &session.scope, panel)
            .await
    }

    pub async fn leave(&self, id: &SessionId) -> Result<(), OfficeError> {
        let change = self
            .registry
            .unregister(id)
            .await
            .ok_or_else(|| OfficeError::expired(id))?;
        info!(session = %id, "Session left");
        self.apply_changes(vec![change]).await;
        Ok(())
    }

    /// Transport went away. Pending submissions are cancelled; the session
    /// stays resumable until it times out.
    pub async fn disconnect(&self, id: &SessionId) -> bool {
        self.registry.disconnect(id).await
    }

    /// Age sessions and tear down empty rooms. Called periodically by the
    /// portal's reaper.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let changes = self.registry.sweep(now).await;

        let mut report = SweepReport::default();
        for change in &changes {
            match change {
                MembershipChange::Stale { session } => report.stale.push(session.clone()),
                MembershipChange::Left { session, .. } => report.timed_out.push(session.clone()),
                _ => {}
            }
        }
        self.apply_changes(changes).await;
        report.torn_down = self.sync.sweep_rooms(now).await;
        report
    }

    pub async fn snapshot(&self, room: &RoomId) -> Result<RoomSnapshot, OfficeError> {
        self.sync.snapshot(room).await
    }

    pub async fn log(&self, room: &RoomId) -> Result<Vec<Delta>, OfficeError> {
        self.sync.log(room).await
    }

    pub async fn rooms(&self) -> Vec<RoomId> {
        self.sync.room_ids().await
    }
}

#[cfg(test)]
mod tests;
