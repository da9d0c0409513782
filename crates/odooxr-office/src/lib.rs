pub mod bridge;
pub mod office;
pub mod presence;
pub mod protocol;
pub mod sync;

pub use bridge::{HostError, HostSystem, MemoryHost, ResourceBridge};
pub use office::{JoinTicket, Office, SweepReport};
pub use presence::{MembershipChange, PresenceRegistry, Session};
pub use protocol::{
    ClientDelta, Delta, DeltaBody, MemberInfo, PanelAcl, ResourceKind, ResourcePanel,
    ResourceRef, RoomSnapshot, SyncMessage,
};
pub use sync::{RoomState, Subscription, Synchronizer};
