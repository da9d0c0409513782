//! Portal wire protocol. Every frame is a JSON text frame tagged by `type`.
//!
//! The first client frame is a [`ClientHello`]; everything after it is a
//! [`ClientRequest`]. The server multiplexes room output (`snapshot`,
//! `delta`) with replies to requests on the same socket.

use odooxr_common::{ClientMode, OfficeError, PanelId, RoomId};
use odooxr_office::{ClientDelta, Delta, ResourcePanel, ResourceRef, RoomSnapshot, SyncMessage};
use serde::{Deserialize, Serialize};

/// A resource the page wants on screen when the session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRequest {
    pub panel: PanelId,
    pub resource: ResourceRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientHello {
    Join {
        room: RoomId,
        user_id: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        mode: ClientMode,
        #[serde(default)]
        resources: Vec<PanelRequest>,
    },
    Resume {
        token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// `id` is echoed in the `accepted`/`rejected` reply.
    Submit {
        id: u64,
        delta: ClientDelta,
    },
    Hydrate {
        id: u64,
        panel: PanelId,
    },
    Heartbeat,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        token: String,
        room: RoomId,
        #[serde(default)]
        opened: Vec<PanelId>,
    },
    Snapshot(RoomSnapshot),
    Delta(Delta),
    Accepted {
        id: u64,
        seq: u64,
    },
    /// `id` is absent when the rejected frame was the hello or a heartbeat.
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        error: OfficeError,
    },
    Panel {
        id: u64,
        panel: ResourcePanel,
    },
    Pong,
    Error {
        message: String,
    },
}

impl From<SyncMessage> for ServerMessage {
    fn from(msg: SyncMessage) -> Self {
        match msg {
            SyncMessage::Snapshot(snapshot) => ServerMessage::Snapshot(snapshot),
            SyncMessage::Delta(delta) => ServerMessage::Delta(delta),
        }
    }
}
