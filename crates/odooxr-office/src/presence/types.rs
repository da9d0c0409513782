//! Session records and the membership changes the registry reports.

use chrono::{DateTime, Utc};
use odooxr_common::{
    AccessScope, ClientMode, ConnectionState, LeaveReason, RoomId, SessionId, UserIdentity,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A user's connection to one room.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user: UserIdentity,
    /// Fixed for the session's lifetime. Moving rooms means a new session.
    pub room: RoomId,
    pub mode: ClientMode,
    pub scope: AccessScope,
    pub state: ConnectionState,
    pub last_seen: Instant,
    pub joined_at: DateTime<Utc>,
    /// Cancelled on disconnect, leave and replacement. Pending submissions
    /// select on it.
    pub cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        user: UserIdentity,
        room: RoomId,
        mode: ClientMode,
        scope: AccessScope,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user,
            room,
            mode,
            scope,
            state: ConnectionState::Connecting,
            last_seen: Instant::now(),
            joined_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Membership changes
// ---------------------------------------------------------------------------

/// Reported by the registry; the engine turns `Left` into a leave delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Joined {
        session: SessionId,
        room: RoomId,
    },
    Stale {
        session: SessionId,
    },
    Resumed {
        session: SessionId,
    },
    Left {
        session: SessionId,
        room: RoomId,
        reason: LeaveReason,
    },
}
