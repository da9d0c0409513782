use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::{PanelId, RoomId, SessionId};
use crate::types::LeaveReason;

/// Lifecycle notifications for observers (logging, metrics sinks, admin UIs).
///
/// Room deltas do not travel over this bus; they have their own ordered
/// per-room streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SessionJoined {
        session: SessionId,
        room: RoomId,
        user_id: String,
    },
    SessionStale {
        session: SessionId,
    },
    SessionResumed {
        session: SessionId,
    },
    SessionClosed {
        session: SessionId,
        room: RoomId,
        reason: LeaveReason,
    },
    RoomCreated(RoomId),
    RoomTornDown(RoomId),
    PanelInvalidated {
        room: RoomId,
        panel: PanelId,
    },
    Shutdown,
    #[serde(other)]
    Unknown,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Returns how many received it.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
