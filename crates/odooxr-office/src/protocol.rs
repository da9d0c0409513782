//! Room-level protocol types.
//!
//! These are the values that flow through a room: what clients submit
//! (`ClientDelta`), what the room commits and broadcasts (`Delta`), and what a
//! subscriber receives (`SyncMessage`). The portal gateway wraps them in its
//! own socket envelope.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use odooxr_common::{ClientMode, LeaveReason, PanelId, RoomId, SessionId, Transform, UserIdentity};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Kind of host resource a panel embeds. Each kind has its own adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A single business record (form view). Writable.
    Record,
    /// A list/kanban view over a model. Read-only.
    View,
    /// A rendered report. Read-only.
    Report,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Record => "record",
            ResourceKind::View => "view",
            ResourceKind::Report => "report",
        }
    }
}

/// Reference to a host resource, written `kind:model/id`
/// (e.g. `record:account.move/42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub model: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, model: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind,
            model: model.into(),
            id: id.to_string(),
        }
    }

    pub fn record(model: impl Into<String>, id: impl ToString) -> Self {
        Self::new(ResourceKind::Record, model, id)
    }

    pub fn view(model: impl Into<String>, view_id: impl ToString) -> Self {
        Self::new(ResourceKind::View, model, view_id)
    }

    pub fn report(model: impl Into<String>, report_id: impl ToString) -> Self {
        Self::new(ResourceKind::Report, model, report_id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind.as_str(), self.model, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("missing kind in resource reference '{s}'"))?;
        let kind = match kind {
            "record" => ResourceKind::Record,
            "view" => ResourceKind::View,
            "report" => ResourceKind::Report,
            other => return Err(format!("unknown resource kind '{other}'")),
        };
        let (model, id) = rest
            .split_once('/')
            .ok_or_else(|| format!("missing id in resource reference '{s}'"))?;
        if model.is_empty() || id.is_empty() {
            return Err(format!("empty model or id in resource reference '{s}'"));
        }
        Ok(Self::new(kind, model, id))
    }
}

/// Groups allowed to read and to write a resource, as reported by the host.
/// An empty set means "anyone".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelAcl {
    #[serde(default)]
    pub read: BTreeSet<String>,
    #[serde(default)]
    pub write: BTreeSet<String>,
}

/// A host resource embedded in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePanel {
    pub id: PanelId,
    pub resource: ResourceRef,
    pub title: String,
    /// Opaque rendering hints for the portal (layout, columns, colors).
    pub descriptor: serde_json::Value,
    /// Current field values. Empty for read-only kinds that render as a blob.
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Host version the fields correspond to.
    pub version: u64,
    pub writable: bool,
    pub acl: PanelAcl,
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// A room member as seen by other members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub session: SessionId,
    pub user: UserIdentity,
    pub mode: ClientMode,
    pub transform: Transform,
    /// Panel the member is currently looking at, if any.
    pub focus: Option<PanelId>,
}

impl MemberInfo {
    pub fn new(session: SessionId, user: UserIdentity, mode: ClientMode) -> Self {
        Self {
            session,
            user,
            mode,
            transform: Transform::default(),
            focus: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// A change a client asks the room to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientDelta {
    Presence {
        transform: Transform,
    },
    Focus {
        panel: Option<PanelId>,
    },
    OpenPanel {
        panel: PanelId,
        resource: ResourceRef,
    },
    ClosePanel {
        panel: PanelId,
    },
    UpdateField {
        panel: PanelId,
        field: String,
        value: serde_json::Value,
        /// Panel version the client edited against. Stale versions are rejected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_version: Option<u64>,
    },
}

impl ClientDelta {
    /// Panel the delta targets, if any.
    pub fn panel(&self) -> Option<&PanelId> {
        match self {
            ClientDelta::Presence { .. } => None,
            ClientDelta::Focus { panel } => panel.as_ref(),
            ClientDelta::OpenPanel { panel, .. }
            | ClientDelta::ClosePanel { panel }
            | ClientDelta::UpdateField { panel, .. } => Some(panel),
        }
    }
}

/// A committed change. Applying every body of a room's log in order to an
/// empty state yields the room's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaBody {
    MemberJoined {
        member: MemberInfo,
    },
    MemberLeft {
        session: SessionId,
        reason: LeaveReason,
    },
    Presence {
        session: SessionId,
        transform: Transform,
    },
    Focus {
        session: SessionId,
        panel: Option<PanelId>,
    },
    PanelOpened {
        panel: ResourcePanel,
    },
    PanelClosed {
        panel: PanelId,
    },
    FieldUpdated {
        panel: PanelId,
        field: String,
        value: serde_json::Value,
        version: u64,
    },
    PanelInvalidated {
        panel: PanelId,
    },
    /// The host moved on without this room (another room wrote the same
    /// resource, or a write outlived its submitter). Replaces the panel.
    PanelRefreshed {
        panel: ResourcePanel,
    },
}

impl DeltaBody {
    pub fn kind(&self) -> &'static str {
        match self {
            DeltaBody::MemberJoined { .. } => "member_joined",
            DeltaBody::MemberLeft { .. } => "member_left",
            DeltaBody::Presence { .. } => "presence",
            DeltaBody::Focus { .. } => "focus",
            DeltaBody::PanelOpened { .. } => "panel_opened",
            DeltaBody::PanelClosed { .. } => "panel_closed",
            DeltaBody::FieldUpdated { .. } => "field_updated",
            DeltaBody::PanelInvalidated { .. } => "panel_invalidated",
            DeltaBody::PanelRefreshed { .. } => "panel_refreshed",
        }
    }
}

/// An entry of a room's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub room: RoomId,
    pub seq: u64,
    /// Submitting session. `None` for deltas the room emits itself
    /// (timeouts, invalidations).
    pub origin: Option<SessionId>,
    pub body: DeltaBody,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Materialized room state as of `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomId,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberInfo>,
    pub panels: Vec<ResourcePanel>,
}

impl RoomSnapshot {
    pub fn member(&self, session: &SessionId) -> Option<&MemberInfo> {
        self.members.iter().find(|m| &m.session == session)
    }

    pub fn panel(&self, panel: &PanelId) -> Option<&ResourcePanel> {
        self.panels.iter().find(|p| &p.id == panel)
    }
}

/// What a room subscription yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    Snapshot(RoomSnapshot),
    Delta(Delta),
}

impl SyncMessage {
    pub fn seq(&self) -> u64 {
        match self {
            SyncMessage::Snapshot(s) => s.seq,
            SyncMessage::Delta(d) => d.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ref_display_and_parse() {
        let r = ResourceRef::record("account.move", 42);
        assert_eq!(r.to_string(), "record:account.move/42");
        assert_eq!("record:account.move/42".parse::<ResourceRef>().unwrap(), r);

        let v: ResourceRef = "view:crm.lead/kanban".parse().unwrap();
        assert_eq!(v.kind, ResourceKind::View);
        assert_eq!(v.id, "kanban");
    }

    #[test]
    fn resource_ref_parse_errors() {
        assert!("account.move/42".parse::<ResourceRef>().is_err());
        assert!("widget:account.move/42".parse::<ResourceRef>().is_err());
        assert!("record:account.move".parse::<ResourceRef>().is_err());
        assert!("record:/42".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn client_delta_wire_format() {
        let delta: ClientDelta = serde_json::from_str(
            r#"{"kind":"update_field","panel":"invoice-42","field":"status","value":"paid"}"#,
        )
        .unwrap();
        assert_eq!(
            delta,
            ClientDelta::UpdateField {
                panel: PanelId::from("invoice-42"),
                field: "status".into(),
                value: serde_json::json!("paid"),
                expected_version: None,
            }
        );
        assert_eq!(delta.panel().map(PanelId::as_str), Some("invoice-42"));
    }

    #[test]
    fn presence_delta_wire_format() {
        let delta: ClientDelta = serde_json::from_str(
            r#"{"kind":"presence","transform":{"position":{"x":1,"y":0,"z":0}}}"#,
        )
        .unwrap();
        assert_eq!(
            delta,
            ClientDelta::Presence {
                transform: Transform::at(1.0, 0.0, 0.0)
            }
        );
        assert!(delta.panel().is_none());
    }

    #[test]
    fn sync_message_is_tagged() {
        let msg = SyncMessage::Delta(Delta {
            room: RoomId::from("r1"),
            seq: 7,
            origin: None,
            body: DeltaBody::PanelClosed {
                panel: PanelId::from("p"),
            },
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "delta");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["body"]["kind"], "panel_closed");
        assert_eq!(msg.seq(), 7);
    }
}
