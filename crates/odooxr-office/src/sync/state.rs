//! Materialized room state and the pure fold that builds it from deltas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use odooxr_common::{PanelId, RoomId, SessionId};

use crate::protocol::{Delta, DeltaBody, MemberInfo, ResourcePanel, RoomSnapshot};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    /// Sequence number of the last applied delta. 0 for an empty room.
    pub seq: u64,
    pub members: BTreeMap<SessionId, MemberInfo>,
    pub panels: BTreeMap<PanelId, ResourcePanel>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `log` over an empty state.
    pub fn replay<'a>(log: impl IntoIterator<Item = &'a Delta>) -> Self {
        let mut state = Self::new();
        for delta in log {
            state.apply(delta);
        }
        state
    }

    pub fn apply(&mut self, delta: &Delta) {
        self.seq = delta.seq;
        match &delta.body {
            DeltaBody::MemberJoined { member } => {
                self.members.insert(member.session.clone(), member.clone());
            }
            DeltaBody::MemberLeft { session, .. } => {
                self.members.remove(session);
            }
            DeltaBody::Presence { session, transform } => {
                if let Some(member) = self.members.get_mut(session) {
                    member.transform = *transform;
                }
            }
            DeltaBody::Focus { session, panel } => {
                if let Some(member) = self.members.get_mut(session) {
                    member.focus = panel.clone();
                }
            }
            DeltaBody::PanelOpened { panel } => {
                self.panels.insert(panel.id.clone(), panel.clone());
            }
            DeltaBody::PanelClosed { panel } | DeltaBody::PanelInvalidated { panel } => {
                self.panels.remove(panel);
                self.clear_focus(panel);
            }
            DeltaBody::FieldUpdated {
                panel,
                field,
                value,
                version,
            } => {
                if let Some(p) = self.panels.get_mut(panel) {
                    p.fields.insert(field.clone(), value.clone());
                    p.version = *version;
                }
            }
            DeltaBody::PanelRefreshed { panel } => {
                if let Some(p) = self.panels.get_mut(&panel.id) {
                    *p = panel.clone();
                }
            }
        }
    }

    fn clear_focus(&mut self, panel: &PanelId) {
        for member in self.members.values_mut() {
            if member.focus.as_ref() == Some(panel) {
                member.focus = None;
            }
        }
    }

    pub fn is_member(&self, session: &SessionId) -> bool {
        self.members.contains_key(session)
    }

    pub fn panel(&self, panel: &PanelId) -> Option<&ResourcePanel> {
        self.panels.get(panel)
    }

    pub fn snapshot(&self, room: &RoomId, created_at: DateTime<Utc>) -> RoomSnapshot {
        RoomSnapshot {
            room: room.clone(),
            seq: self.seq,
            created_at,
            members: self.members.values().cloned().collect(),
            panels: self.panels.values().cloned().collect(),
        }
    }
}
