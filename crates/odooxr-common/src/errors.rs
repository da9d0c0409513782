use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Rejections surfaced to the client that originated a request.
///
/// These are never broadcast to other room members. The serialized form is
/// a tagged object (`{"code": "conflict", ...}`) so the portal snippet can
/// branch on `code` without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum OfficeError {
    #[error("session expired: {session}")]
    ExpiredSession { session: String },

    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("not found: {resource}")]
    NotFound { resource: String, retry: bool },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("throttled, retry in {retry_after_ms}ms")]
    Throttled { retry_after_ms: u64 },

    #[error("invalid room: {room}")]
    InvalidRoom { room: String },

    #[error("invalid delta: {reason}")]
    InvalidDelta { reason: String },

    #[error("submission cancelled")]
    Cancelled,
}

impl OfficeError {
    pub fn expired(session: impl ToString) -> Self {
        Self::ExpiredSession {
            session: session.to_string(),
        }
    }

    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            retry: false,
        }
    }

    /// Host was unreachable or slow. The resource may well exist.
    pub fn unavailable(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            retry: true,
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn invalid_delta(reason: impl Into<String>) -> Self {
        Self::InvalidDelta {
            reason: reason.into(),
        }
    }

    pub fn invalid_room(room: impl ToString) -> Self {
        Self::InvalidRoom {
            room: room.to_string(),
        }
    }

    /// Whether the client should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { retry: true, .. } | Self::Conflict { .. } | Self::Throttled { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum XrError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Office(#[from] OfficeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}
