//! Presence registry.
//!
//! Tracks which sessions exist, which room each belongs to and whether they
//! are still heartbeating. It never touches room state; membership changes
//! are returned to the caller, which applies them to the synchronizer, and
//! mirrored onto the common event bus.

mod registry;
mod types;

pub use registry::PresenceRegistry;
pub use types::{MembershipChange, Session};

#[cfg(test)]
mod tests;
