//! A single room: the ordering authority for its log and state.

use chrono::{DateTime, Utc};
use odooxr_common::{RoomId, SessionId};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::protocol::{Delta, DeltaBody, RoomSnapshot};

use super::state::RoomState;

/// Everything guarded by the room lock. Sequence assignment, state
/// application, log append and broadcast all happen while it is held, so
/// subscribers see deltas in exactly log order.
pub struct RoomCore {
    id: RoomId,
    created_at: DateTime<Utc>,
    state: RoomState,
    log: Vec<Delta>,
    empty_since: Option<Instant>,
    tx: broadcast::Sender<Delta>,
}

impl RoomCore {
    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn log(&self) -> &[Delta] {
        &self.log
    }

    /// When the last member left, if the room is empty.
    pub fn empty_since(&self) -> Option<Instant> {
        self.empty_since
    }

    /// Assign the next sequence number to `body`, apply it and broadcast it.
    pub fn commit(&mut self, origin: Option<SessionId>, body: DeltaBody) -> Delta {
        let delta = Delta {
            room: self.id.clone(),
            seq: self.state.seq + 1,
            origin,
            body,
        };
        self.state.apply(&delta);
        self.log.push(delta.clone());

        if self.state.members.is_empty() {
            self.empty_since.get_or_insert_with(Instant::now);
        } else {
            self.empty_since = None;
        }

        // No receivers is fine: nobody is subscribed yet.
        let _ = self.tx.send(delta.clone());
        delta
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.state.snapshot(&self.id, self.created_at)
    }

    /// Snapshot plus a receiver that yields every delta committed after it.
    pub fn snapshot_and_subscribe(&self) -> (RoomSnapshot, broadcast::Receiver<Delta>) {
        (self.snapshot(), self.tx.subscribe())
    }
}

pub struct Room {
    id: RoomId,
    created_at: DateTime<Utc>,
    core: Mutex<RoomCore>,
}

impl Room {
    pub fn new(id: RoomId, broadcast_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(broadcast_capacity.max(1));
        let created_at = Utc::now();
        Self {
            core: Mutex::new(RoomCore {
                id: id.clone(),
                created_at,
                state: RoomState::new(),
                log: Vec::new(),
                empty_since: Some(Instant::now()),
                tx,
            }),
            id,
            created_at,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn lock(&self) -> MutexGuard<'_, RoomCore> {
        self.core.lock().await
    }

    pub async fn snapshot_and_subscribe(&self) -> (RoomSnapshot, broadcast::Receiver<Delta>) {
        self.core.lock().await.snapshot_and_subscribe()
    }
}
