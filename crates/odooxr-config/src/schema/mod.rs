//! Configuration schema types for the odooxr portal.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with defaults suitable for a single-host deployment.

mod bridge;
mod gateway;
mod presence;
mod system;

pub use bridge::*;
pub use gateway::*;
pub use presence::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the virtual office.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct OfficeConfig {
    pub presence: PresenceConfig,
    pub rooms: RoomsConfig,
    pub bridge: BridgeConfig,
    pub host: HostConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
