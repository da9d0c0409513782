//! Resource bridge and host-system configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host calls slower than this are reported as retryable `not_found`.
    pub host_timeout_ms: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_timeout_ms: 5000,
        }
    }
}

impl BridgeConfig {
    pub fn host_timeout(&self) -> Duration {
        Duration::from_millis(self.host_timeout_ms.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Seed the in-process host with demo records.
    pub demo_data: bool,
    /// Groups granted to users the host does not know about.
    pub default_groups: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            demo_data: true,
            default_groups: vec!["base.group_user".into()],
        }
    }
}
