pub mod errors;
pub mod events;
pub mod id;
pub mod types;

pub use errors::{ConfigError, OfficeError, XrError};
pub use events::{Event, EventBus};
pub use id::{new_correlation_id, new_id, PanelId, RoomId, SessionId};
pub use types::{
    AccessScope, ClientMode, ConnectionState, LeaveReason, Quat, Transform, UserIdentity, Vec3,
};

pub type Result<T> = std::result::Result<T, XrError>;
