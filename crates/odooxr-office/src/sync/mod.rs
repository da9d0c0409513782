//! Session synchronizer.
//!
//! Each room is its own ordering authority: a log, a materialized state and
//! a broadcast channel behind one async mutex. Rooms never share locks, so
//! they proceed independently.

pub mod room;
pub mod state;
pub mod subscription;
pub mod synchronizer;

pub use room::Room;
pub use state::RoomState;
pub use subscription::Subscription;
pub use synchronizer::{SyncSettings, Synchronizer};
