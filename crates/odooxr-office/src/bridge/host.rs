//! The host business system seen from the office.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use odooxr_common::{AccessScope, UserIdentity};

/// Errors reported by the host. The bridge maps these onto `OfficeError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("version mismatch: expected {expected}, host has {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("field {0} is read-only")]
    ReadOnlyField(String),

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// A business record as returned by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub model: String,
    pub id: String,
    pub display_name: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Bumped by the host on every write.
    pub version: u64,
    pub read_groups: BTreeSet<String>,
    pub write_groups: BTreeSet<String>,
    /// Fields the host refuses to write through the portal.
    pub readonly_fields: BTreeSet<String>,
}

/// A list or kanban view definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HostView {
    pub model: String,
    pub view_id: String,
    pub title: String,
    /// Layout description the portal renders from (columns, grouping).
    pub arch: serde_json::Value,
    pub rows: Vec<serde_json::Value>,
    pub read_groups: BTreeSet<String>,
}

/// A rendered report.
#[derive(Debug, Clone, PartialEq)]
pub struct HostReport {
    pub model: String,
    pub report_id: String,
    pub title: String,
    pub content: serde_json::Value,
    pub read_groups: BTreeSet<String>,
}

/// Read/write access to the host business system.
///
/// Every call carries the caller's scope; implementations must enforce it
/// themselves rather than trust the bridge's pre-checks.
#[async_trait]
pub trait HostSystem: Send + Sync {
    /// Resolve the access scope of a host user.
    async fn scope_for(&self, user: &UserIdentity) -> Result<AccessScope, HostError>;

    async fn read_record(
        &self,
        model: &str,
        id: &str,
        scope: &AccessScope,
    ) -> Result<HostRecord, HostError>;

    /// Write one field if the record is still at `expected_version`.
    /// Returns the new version.
    async fn write_field(
        &self,
        model: &str,
        id: &str,
        field: &str,
        value: &serde_json::Value,
        expected_version: u64,
        scope: &AccessScope,
    ) -> Result<u64, HostError>;

    async fn describe_view(
        &self,
        model: &str,
        view_id: &str,
        scope: &AccessScope,
    ) -> Result<HostView, HostError>;

    async fn render_report(
        &self,
        model: &str,
        report_id: &str,
        scope: &AccessScope,
    ) -> Result<HostReport, HostError>;
}
