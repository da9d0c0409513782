//! Portal gateway configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener, handshake and rate-limit settings for the portal gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Seconds a new socket has to send its join/resume hello.
    pub hello_timeout_secs: u32,
    /// Sustained delta submissions allowed per session per second.
    pub rate_per_sec: u32,
    /// Burst size on top of the sustained rate.
    pub burst: u32,
    /// Outbound frames queued per socket.
    pub outbound_buffer: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8765,
            hello_timeout_secs: 10,
            rate_per_sec: 20,
            burst: 40,
            outbound_buffer: 256,
        }
    }
}

impl GatewayConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs.into())
    }
}
