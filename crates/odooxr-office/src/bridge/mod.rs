//! Resource bridge between rooms and the host business system.
//!
//! Panels never talk to the host directly. Reads and writes go through the
//! bridge, which picks the adapter for the resource kind, enforces the
//! per-resource write lock and a host timeout, and maps host failures onto
//! `OfficeError`.

pub mod adapters;
pub mod host;
pub mod locks;
pub mod manager;
pub mod memory;

pub use adapters::{adapter_for, FieldWrite, ResourceAdapter};
pub use host::{HostError, HostRecord, HostReport, HostSystem, HostView};
pub use locks::{PanelLocks, WriteGuard};
pub use manager::ResourceBridge;
pub use memory::MemoryHost;
