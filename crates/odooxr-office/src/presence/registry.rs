use std::collections::HashMap;
use std::time::Duration;

use odooxr_common::{
    AccessScope, ClientMode, ConnectionState, Event, EventBus, LeaveReason, OfficeError, RoomId,
    SessionId, UserIdentity,
};
use odooxr_config::schema::PresenceConfig;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{MembershipChange, Session};

// ---------------------------------------------------------------------------
// Presence Registry
// ---------------------------------------------------------------------------

struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    /// Live session per host user id. One session per identity.
    by_user: HashMap<String, SessionId>,
}

impl RegistryState {
    fn take(&mut self, id: &SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(id)?;
        if self.by_user.get(&session.user.user_id) == Some(id) {
            self.by_user.remove(&session.user.user_id);
        }
        session.transition(ConnectionState::Closed);
        session.cancel.cancel();
        Some(session)
    }
}

pub struct PresenceRegistry {
    /// Sessions + user mapping under a single lock.
    state: RwLock<RegistryState>,
    stale_after: Duration,
    timeout: Duration,
    events: EventBus,
}

impl PresenceRegistry {
    pub fn new(stale_after: Duration, timeout: Duration, events: EventBus) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                sessions: HashMap::new(),
                by_user: HashMap::new(),
            }),
            stale_after,
            timeout,
            events,
        }
    }

    pub fn from_config(config: &PresenceConfig, events: EventBus) -> Self {
        Self::new(config.stale_after(), config.timeout(), events)
    }

    fn publish(&self, change: &MembershipChange, user_id: &str) {
        let event = match change {
            MembershipChange::Joined { session, room } => Event::SessionJoined {
                session: session.clone(),
                room: room.clone(),
                user_id: user_id.to_string(),
            },
            MembershipChange::Stale { session } => Event::SessionStale {
                session: session.clone(),
            },
            MembershipChange::Resumed { session } => Event::SessionResumed {
                session: session.clone(),
            },
            MembershipChange::Left {
                session,
                room,
                reason,
            } => Event::SessionClosed {
                session: session.clone(),
                room: room.clone(),
                reason: *reason,
            },
        };
        self.events.publish(event);
    }

    /// Create a `connecting` session for `user` in `room`.
    ///
    /// If the identity already has a live session it is force-closed and
    /// reported as `Left { reason: Replaced }`.
    pub async fn register(
        &self,
        user: UserIdentity,
        room: RoomId,
        mode: ClientMode,
        scope: AccessScope,
    ) -> (Session, Vec<MembershipChange>) {
        let mut state = self.state.write().await;
        let mut changes = Vec::new();

        let previous = state.by_user.get(&user.user_id).cloned();
        if let Some(old) = previous.and_then(|id| state.take(&id)) {
            info!(
                session = %old.id,
                user = %old.user.user_id,
                "Session replaced by a newer login"
            );
            changes.push(MembershipChange::Left {
                session: old.id,
                room: old.room,
                reason: LeaveReason::Replaced,
            });
        }

        let session = Session::new(user, room, mode, scope);
        state
            .by_user
            .insert(session.user.user_id.clone(), session.id.clone());
        state.sessions.insert(session.id.clone(), session.clone());
        drop(state);

        for change in &changes {
            self.publish(change, &session.user.user_id);
        }
        (session, changes)
    }

    /// `connecting → active`, once the session is a room member.
    pub async fn activate(&self, id: &SessionId) -> Result<MembershipChange, OfficeError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| OfficeError::expired(id))?;
        if session.state != ConnectionState::Connecting
            || !session.transition(ConnectionState::Active)
        {
            return Err(OfficeError::expired(id));
        }
        session.last_seen = Instant::now();
        let change = MembershipChange::Joined {
            session: id.clone(),
            room: session.room.clone(),
        };
        let user_id = session.user.user_id.clone();
        drop(state);

        self.publish(&change, &user_id);
        Ok(change)
    }

    /// Record liveness. A stale session becomes active again and is
    /// reported as `Resumed`.
    pub async fn heartbeat(&self, id: &SessionId) -> Result<Option<MembershipChange>, OfficeError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| OfficeError::expired(id))?;
        session.last_seen = Instant::now();
        match session.state {
            ConnectionState::Connecting | ConnectionState::Active => return Ok(None),
            ConnectionState::Closed => return Err(OfficeError::expired(id)),
            ConnectionState::Stale => {}
        }

        session.transition(ConnectionState::Active);
        let change = MembershipChange::Resumed {
            session: id.clone(),
        };
        let user_id = session.user.user_id.clone();
        drop(state);

        debug!(session = %id, "Session resumed");
        self.publish(&change, &user_id);
        Ok(Some(change))
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.state.read().await.sessions.get(id).cloned()
    }

    /// Session currently held by a host user.
    pub async fn session_of(&self, user_id: &str) -> Option<SessionId> {
        self.state.read().await.by_user.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Explicit leave. Returns the change to apply, or `None` if the session
    /// was already gone.
    pub async fn unregister(&self, id: &SessionId) -> Option<MembershipChange> {
        let session = self.state.write().await.take(id)?;
        let change = MembershipChange::Left {
            session: session.id.clone(),
            room: session.room.clone(),
            reason: LeaveReason::Left,
        };
        self.publish(&change, &session.user.user_id);
        Some(change)
    }

    /// Drop a session that never became a member (failed join).
    pub async fn discard(&self, id: &SessionId) {
        if let Some(session) = self.state.write().await.take(id) {
            debug!(session = %session.id, "Discarded unjoined session");
        }
    }

    /// Cancel whatever the session has in flight but keep it registered so
    /// the client can resume before the timeout.
    pub async fn disconnect(&self, id: &SessionId) -> bool {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(id) {
            Some(session) => {
                let old = std::mem::replace(&mut session.cancel, CancellationToken::new());
                old.cancel();
                true
            }
            None => false,
        }
    }

    /// Age every session against `now`: `stale_after` without a heartbeat
    /// makes it stale, `timeout` closes it.
    pub async fn sweep(&self, now: Instant) -> Vec<MembershipChange> {
        let mut state = self.state.write().await;
        let mut changes = Vec::new();
        let mut published = Vec::new();
        let mut expired = Vec::new();

        for session in state.sessions.values_mut() {
            let idle = now.saturating_duration_since(session.last_seen);
            if idle >= self.timeout {
                expired.push(session.id.clone());
            } else if idle >= self.stale_after
                && session.state == ConnectionState::Active
                && session.transition(ConnectionState::Stale)
            {
                debug!(session = %session.id, idle_ms = idle.as_millis() as u64, "Session stale");
                let change = MembershipChange::Stale {
                    session: session.id.clone(),
                };
                published.push((change.clone(), session.user.user_id.clone()));
                changes.push(change);
            }
        }

        for id in expired {
            if let Some(session) = state.take(&id) {
                info!(session = %session.id, room = %session.room, "Session timed out");
                let change = MembershipChange::Left {
                    session: session.id,
                    room: session.room,
                    reason: LeaveReason::TimedOut,
                };
                published.push((change.clone(), session.user.user_id));
                changes.push(change);
            }
        }
        drop(state);

        for (change, user_id) in &published {
            self.publish(change, user_id);
        }
        changes
    }
}
