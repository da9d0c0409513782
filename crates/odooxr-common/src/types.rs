use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion. Defaults to identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Pose of an avatar in room space, as reported by the client's XR viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    #[serde(default)]
    pub orientation: Quat,
}

impl Transform {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            orientation: Quat::default(),
        }
    }

    pub fn is_finite(&self) -> bool {
        let p = &self.position;
        let o = &self.orientation;
        [p.x, p.y, p.z, o.x, o.y, o.z, o.w]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Active,
    Stale,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Connecting, Active) => true,
            (Active, Active) | (Active, Stale) => true,
            (Stale, Active) => true,
            _ => false,
        }
    }

    pub fn is_live(self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

/// How the client renders the office: a headset session or the 2D page fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    Immersive,
    #[default]
    Inline,
}

/// Why a member left a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Left,
    TimedOut,
    Replaced,
}

/// Host-system user as presented to the office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Access-control context a session reads and writes resources under.
///
/// Resolved once from the host at join time; the host remains the authority
/// and re-checks the scope on every read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub user_id: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl AccessScope {
    pub fn new<I, S>(user_id: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// True if the scope holds at least one of `required`, or `required` is empty.
    pub fn satisfies(&self, required: &BTreeSet<String>) -> bool {
        required.is_empty() || required.iter().any(|g| self.groups.contains(g))
    }
}
