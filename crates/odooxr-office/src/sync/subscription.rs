//! Per-session stream of room output.

use std::sync::Arc;

use odooxr_common::{RoomId, SessionId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::protocol::{Delta, DeltaBody, RoomSnapshot, SyncMessage};

use super::room::Room;

/// Yields a snapshot first, then every delta committed after it in room
/// order.
///
/// A subscriber that falls behind the broadcast buffer gets a fresh snapshot
/// instead of the deltas it missed. The stream ends after the subscriber's
/// own `member_left` delta.
pub struct Subscription {
    room: Arc<Room>,
    session: SessionId,
    pending: Option<RoomSnapshot>,
    rx: broadcast::Receiver<Delta>,
    last_seq: u64,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        room: Arc<Room>,
        session: SessionId,
        snapshot: RoomSnapshot,
        rx: broadcast::Receiver<Delta>,
    ) -> Self {
        Self {
            room,
            session,
            last_seq: snapshot.seq,
            pending: Some(snapshot),
            rx,
            finished: false,
        }
    }

    pub fn room(&self) -> &RoomId {
        self.room.id()
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Sequence number of the last message handed out.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub async fn next(&mut self) -> Option<SyncMessage> {
        if self.finished {
            return None;
        }
        if let Some(snapshot) = self.pending.take() {
            return Some(SyncMessage::Snapshot(snapshot));
        }

        loop {
            match self.rx.recv().await {
                Ok(delta) => {
                    if delta.seq <= self.last_seq {
                        continue;
                    }
                    self.last_seq = delta.seq;
                    if let DeltaBody::MemberLeft { session, .. } = &delta.body {
                        if session == &self.session {
                            self.finished = true;
                        }
                    }
                    return Some(SyncMessage::Delta(delta));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        room = %self.room.id(),
                        session = %self.session,
                        skipped,
                        "Subscriber lagged, resyncing from snapshot"
                    );
                    return Some(SyncMessage::Snapshot(self.resync().await));
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    async fn resync(&mut self) -> RoomSnapshot {
        let (snapshot, rx) = self.room.snapshot_and_subscribe().await;
        self.rx = rx;
        self.last_seq = snapshot.seq;
        snapshot
    }
}
