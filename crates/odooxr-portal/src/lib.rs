//! odooxr-portal: WebSocket gateway in front of the office engine.
//!
//! Browsers and headsets connect here, say hello (join or resume), and then
//! exchange JSON frames: room output flows down, submissions and
//! heartbeats flow up. All room state lives in `odooxr-office`.

pub mod connection;
pub mod gateway;
pub mod protocol;
pub mod rate_limit;
pub mod server;

pub use connection::ConnectionSettings;
pub use gateway::{Gateway, Joined};
pub use protocol::{ClientHello, ClientRequest, PanelRequest, ServerMessage};
pub use rate_limit::RateLimiter;
pub use server::{serve, spawn_reaper, ServerSettings};
