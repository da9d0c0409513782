//! Presence and room lifecycle configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Heartbeat and timeout settings for connected sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Seconds without a heartbeat before a session is marked stale.
    pub stale_after_secs: u32,
    /// Seconds without a heartbeat before a session is closed (must exceed `stale_after_secs`).
    pub timeout_secs: u32,
    /// How often the reaper sweeps sessions and empty rooms.
    pub sweep_interval_ms: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 15,
            timeout_secs: 45,
            sweep_interval_ms: 1000,
        }
    }
}

impl PresenceConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs.into())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.into())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.into())
    }
}

/// Room sizing and teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Seconds an empty room survives before it is torn down.
    pub grace_period_secs: u32,
    pub max_members: u32,
    /// Deltas buffered per room for slow subscribers before they are resynced.
    pub broadcast_capacity: u32,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
            max_members: 64,
            broadcast_capacity: 1024,
        }
    }
}

impl RoomsConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs.into())
    }
}
