//! Session synchronizer: owns every room and turns client submissions into
//! ordered, committed deltas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use odooxr_common::{
    AccessScope, Event, EventBus, LeaveReason, OfficeError, PanelId, RoomId, SessionId,
};
use odooxr_config::OfficeConfig;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::ResourceBridge;
use crate::protocol::{ClientDelta, Delta, DeltaBody, MemberInfo, ResourcePanel, RoomSnapshot};

use super::room::{Room, RoomCore};
use super::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub max_members: usize,
    pub grace_period: Duration,
    pub broadcast_capacity: usize,
    pub log_deltas: bool,
}

impl SyncSettings {
    pub fn from_config(config: &OfficeConfig) -> Self {
        Self {
            max_members: config.rooms.max_members as usize,
            grace_period: config.rooms.grace_period(),
            broadcast_capacity: config.rooms.broadcast_capacity as usize,
            log_deltas: config.logging.log_deltas,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&OfficeConfig::default())
    }
}

pub struct Synchronizer {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    bridge: Arc<ResourceBridge>,
    settings: SyncSettings,
    events: EventBus,
}

fn ensure_member(core: &RoomCore, session: &SessionId) -> Result<(), OfficeError> {
    if core.state().is_member(session) {
        Ok(())
    } else {
        Err(OfficeError::expired(session))
    }
}

fn panel_of(core: &RoomCore, panel: &PanelId) -> Result<ResourcePanel, OfficeError> {
    core.state()
        .panel(panel)
        .cloned()
        .ok_or_else(|| OfficeError::not_found(format!("panel {panel}")))
}

impl Synchronizer {
    pub fn new(bridge: Arc<ResourceBridge>, settings: SyncSettings, events: EventBus) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            bridge,
            settings,
            events,
        }
    }

    async fn room(&self, id: &RoomId) -> Result<Arc<Room>, OfficeError> {
        self.rooms
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OfficeError::invalid_room(id))
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    fn committed(&self, delta: &Delta) {
        if self.settings.log_deltas {
            debug!(
                room = %delta.room,
                seq = delta.seq,
                kind = delta.body.kind(),
                origin = ?delta.origin.as_ref().map(SessionId::as_str),
                "Delta committed"
            );
        }
    }

    /// Add `member` to `room`, creating the room on first join.
    ///
    /// The returned subscription's snapshot already contains the member.
    pub async fn admit(
        &self,
        room_id: &RoomId,
        member: MemberInfo,
    ) -> Result<Subscription, OfficeError> {
        if room_id.as_str().trim().is_empty() {
            return Err(OfficeError::invalid_room(room_id));
        }

        // The map lock is held until the member is committed so a concurrent
        // sweep cannot tear the room down between lookup and join.
        let mut rooms = self.rooms.write().await;
        let room = match rooms.get(room_id) {
            Some(room) => room.clone(),
            None => {
                let room = Arc::new(Room::new(room_id.clone(), self.settings.broadcast_capacity));
                rooms.insert(room_id.clone(), room.clone());
                info!(room = %room_id, "Room created");
                self.events.publish(Event::RoomCreated(room_id.clone()));
                room
            }
        };

        let mut core = room.lock().await;
        drop(rooms);

        if core.state().members.len() >= self.settings.max_members {
            return Err(OfficeError::invalid_room(format!("{room_id} is full")));
        }

        let session = member.session.clone();
        let delta = core.commit(Some(session.clone()), DeltaBody::MemberJoined { member });
        self.committed(&delta);
        let (snapshot, rx) = core.snapshot_and_subscribe();
        drop(core);

        Ok(Subscription::new(room, session, snapshot, rx))
    }

    /// Commit a `member_left` for `session`. No-op if it is not a member.
    pub async fn remove(
        &self,
        room_id: &RoomId,
        session: &SessionId,
        reason: LeaveReason,
    ) -> Option<Delta> {
        let room = self.room(room_id).await.ok()?;
        let mut core = room.lock().await;
        if !core.state().is_member(session) {
            return None;
        }
        let delta = core.commit(
            None,
            DeltaBody::MemberLeft {
                session: session.clone(),
                reason,
            },
        );
        self.committed(&delta);
        Some(delta)
    }

    /// Fresh subscription for an existing member (reconnect).
    pub async fn subscribe(
        &self,
        room_id: &RoomId,
        session: &SessionId,
    ) -> Result<Subscription, OfficeError> {
        let room = self.room(room_id).await?;
        let core = room.lock().await;
        ensure_member(&core, session)?;
        let (snapshot, rx) = core.snapshot_and_subscribe();
        drop(core);
        Ok(Subscription::new(room, session.clone(), snapshot, rx))
    }

    pub async fn snapshot(&self, room_id: &RoomId) -> Result<RoomSnapshot, OfficeError> {
        let room = self.room(room_id).await?;
        let core = room.lock().await;
        Ok(core.snapshot())
    }

    pub async fn log(&self, room_id: &RoomId) -> Result<Vec<Delta>, OfficeError> {
        let room = self.room(room_id).await?;
        let core = room.lock().await;
        Ok(core.log().to_vec())
    }

    /// Validate and commit a client submission.
    ///
    /// Host I/O for panel deltas happens without the room lock. Cancelling
    /// abandons a resolve, or a write that has not reached the host yet,
    /// without consuming a sequence number. A write already sent to the host
    /// runs to completion (bounded by the host timeout) and is committed.
    pub async fn submit(
        &self,
        room_id: &RoomId,
        session: &SessionId,
        scope: &AccessScope,
        delta: ClientDelta,
        cancel: &CancellationToken,
    ) -> Result<Delta, OfficeError> {
        let room = self.room(room_id).await?;
        let origin = Some(session.clone());

        let committed = match delta {
            ClientDelta::Presence { transform } => {
                if !transform.is_finite() {
                    return Err(OfficeError::invalid_delta("transform is not finite"));
                }
                let mut core = room.lock().await;
                ensure_member(&core, session)?;
                core.commit(
                    origin,
                    DeltaBody::Presence {
                        session: session.clone(),
                        transform,
                    },
                )
            }

            ClientDelta::Focus { panel } => {
                let mut core = room.lock().await;
                ensure_member(&core, session)?;
                if let Some(panel) = &panel {
                    panel_of(&core, panel)?;
                }
                core.commit(
                    origin,
                    DeltaBody::Focus {
                        session: session.clone(),
                        panel,
                    },
                )
            }

            ClientDelta::OpenPanel { panel, resource } => {
                {
                    let core = room.lock().await;
                    ensure_member(&core, session)?;
                    if core.state().panel(&panel).is_some() {
                        return Err(OfficeError::conflict(format!("panel {panel} is already open")));
                    }
                }

                let resolved = tokio::select! {
                    _ = cancel.cancelled() => return Err(OfficeError::Cancelled),
                    r = self.bridge.resolve(panel.clone(), &resource, scope) => r?,
                };

                let mut core = room.lock().await;
                ensure_member(&core, session)?;
                if core.state().panel(&panel).is_some() {
                    return Err(OfficeError::conflict(format!("panel {panel} is already open")));
                }
                core.commit(origin, DeltaBody::PanelOpened { panel: resolved })
            }

            ClientDelta::ClosePanel { panel } => {
                let mut core = room.lock().await;
                ensure_member(&core, session)?;
                panel_of(&core, &panel)?;
                core.commit(origin, DeltaBody::PanelClosed { panel })
            }

            ClientDelta::UpdateField {
                panel,
                field,
                value,
                expected_version,
            } => {
                if field.trim().is_empty() {
                    return Err(OfficeError::invalid_delta("field name is empty"));
                }
                let current = {
                    let core = room.lock().await;
                    ensure_member(&core, session)?;
                    panel_of(&core, &panel)?
                };
                if let Some(expected) = expected_version {
                    if expected != current.version {
                        return Err(OfficeError::conflict(format!(
                            "panel {panel} is at version {}, not {expected}",
                            current.version
                        )));
                    }
                }

                if cancel.is_cancelled() {
                    return Err(OfficeError::Cancelled);
                }
                let version = match self.bridge.apply(&current, &field, &value, scope).await {
                    Ok(version) => version,
                    Err(err @ OfficeError::NotFound { retry: false, .. }) => {
                        self.invalidate(room_id, &panel).await;
                        return Err(err);
                    }
                    Err(err @ OfficeError::Conflict { .. }) => {
                        self.reload(room_id, &current, scope).await;
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                };

                // The host accepted the write, so it is committed even if the
                // writer left while it was in flight. The panel itself must
                // still be open on the same resource.
                let mut core = room.lock().await;
                let still_open = core
                    .state()
                    .panel(&panel)
                    .is_some_and(|p| p.resource == current.resource);
                if !still_open {
                    debug!(
                        room = %room_id,
                        panel = %panel,
                        version,
                        "Panel closed while its write was in flight"
                    );
                    return Err(OfficeError::not_found(format!("panel {panel}")));
                }
                core.commit(
                    origin,
                    DeltaBody::FieldUpdated {
                        panel,
                        field,
                        value,
                        version,
                    },
                )
            }
        };

        self.committed(&committed);
        Ok(committed)
    }

    /// Read-through refresh of one panel for `session`. If the host has
    /// moved past the room's copy, a `panel_refreshed` delta brings the room
    /// up to date; if the resource is gone, the panel is invalidated.
    pub async fn hydrate(
        &self,
        room_id: &RoomId,
        session: &SessionId,
        scope: &AccessScope,
        panel: &PanelId,
    ) -> Result<ResourcePanel, OfficeError> {
        let room = self.room(room_id).await?;
        let current = {
            let core = room.lock().await;
            ensure_member(&core, session)?;
            panel_of(&core, panel)?
        };

        match self
            .bridge
            .resolve(panel.clone(), &current.resource, scope)
            .await
        {
            Ok(fresh) => {
                self.refresh(&room, &fresh).await;
                Ok(fresh)
            }
            Err(err @ OfficeError::NotFound { retry: false, .. }) => {
                self.invalidate(room_id, panel).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Re-read `current` from the host after a rejected write so the room
    /// stops writing against a version the host has left behind.
    async fn reload(&self, room_id: &RoomId, current: &ResourcePanel, scope: &AccessScope) {
        let Ok(room) = self.room(room_id).await else {
            return;
        };
        match self
            .bridge
            .resolve(current.id.clone(), &current.resource, scope)
            .await
        {
            Ok(fresh) => {
                self.refresh(&room, &fresh).await;
            }
            Err(OfficeError::NotFound { retry: false, .. }) => {
                self.invalidate(room_id, &current.id).await;
            }
            Err(e) => debug!(room = %room_id, panel = %current.id, error = %e, "Reload skipped"),
        }
    }

    /// Commit `fresh` over the room's copy of the panel if it differs.
    async fn refresh(&self, room: &Room, fresh: &ResourcePanel) -> Option<Delta> {
        let mut core = room.lock().await;
        let held = core.state().panel(&fresh.id)?;
        if held.resource != fresh.resource
            || (held.version == fresh.version && held.fields == fresh.fields)
        {
            return None;
        }
        let delta = core.commit(
            None,
            DeltaBody::PanelRefreshed {
                panel: fresh.clone(),
            },
        );
        drop(core);

        info!(room = %delta.room, panel = %fresh.id, version = fresh.version, "Panel refreshed");
        self.committed(&delta);
        Some(delta)
    }

    /// Drop `panel` from the room because its resource is gone.
    pub async fn invalidate(&self, room_id: &RoomId, panel: &PanelId) -> Option<Delta> {
        let room = self.room(room_id).await.ok()?;
        let mut core = room.lock().await;
        core.state().panel(panel)?;
        let delta = core.commit(
            None,
            DeltaBody::PanelInvalidated {
                panel: panel.clone(),
            },
        );
        drop(core);

        info!(room = %room_id, panel = %panel, "Panel invalidated");
        self.events.publish(Event::PanelInvalidated {
            room: room_id.clone(),
            panel: panel.clone(),
        });
        self.committed(&delta);
        Some(delta)
    }

    /// Tear down rooms that have been empty for the grace period.
    pub async fn sweep_rooms(&self, now: Instant) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let mut expired = Vec::new();
        for (id, room) in rooms.iter() {
            let core = room.lock().await;
            if let Some(since) = core.empty_since() {
                if now.saturating_duration_since(since) >= self.settings.grace_period {
                    expired.push(id.clone());
                }
            }
        }

        for id in &expired {
            rooms.remove(id);
            info!(room = %id, "Room torn down");
            self.events.publish(Event::RoomTornDown(id.clone()));
        }
        expired
    }
}
