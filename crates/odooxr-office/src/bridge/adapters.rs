//! One adapter per resource kind. Each knows how to turn host data into a
//! panel and, for writable kinds, how to push a field edit back.

use async_trait::async_trait;
use odooxr_common::{AccessScope, PanelId};
use serde_json::json;

use crate::protocol::{PanelAcl, ResourceKind, ResourcePanel, ResourceRef};

use super::host::{HostError, HostSystem};

/// A single field edit headed for the host.
#[derive(Debug, Clone, Copy)]
pub struct FieldWrite<'a> {
    pub field: &'a str,
    pub value: &'a serde_json::Value,
    pub expected_version: u64,
}

#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn resolve(
        &self,
        host: &dyn HostSystem,
        panel: PanelId,
        resource: &ResourceRef,
        scope: &AccessScope,
    ) -> Result<ResourcePanel, HostError>;

    async fn apply_field(
        &self,
        host: &dyn HostSystem,
        resource: &ResourceRef,
        write: FieldWrite<'_>,
        scope: &AccessScope,
    ) -> Result<u64, HostError>;
}

static RECORD: RecordAdapter = RecordAdapter;
static VIEW: ViewAdapter = ViewAdapter;
static REPORT: ReportAdapter = ReportAdapter;

pub fn adapter_for(kind: ResourceKind) -> &'static dyn ResourceAdapter {
    match kind {
        ResourceKind::Record => &RECORD,
        ResourceKind::View => &VIEW,
        ResourceKind::Report => &REPORT,
    }
}

fn read_only(resource: &ResourceRef) -> HostError {
    HostError::AccessDenied(format!("{} panels are read-only", resource.kind.as_str()))
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

pub struct RecordAdapter;

#[async_trait]
impl ResourceAdapter for RecordAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Record
    }

    async fn resolve(
        &self,
        host: &dyn HostSystem,
        panel: PanelId,
        resource: &ResourceRef,
        scope: &AccessScope,
    ) -> Result<ResourcePanel, HostError> {
        let record = host
            .read_record(&resource.model, &resource.id, scope)
            .await?;
        Ok(ResourcePanel {
            id: panel,
            resource: resource.clone(),
            title: record.display_name,
            descriptor: json!({
                "layout": "form",
                "readonly": record.readonly_fields,
            }),
            fields: record.fields,
            version: record.version,
            writable: true,
            acl: PanelAcl {
                read: record.read_groups,
                write: record.write_groups,
            },
        })
    }

    async fn apply_field(
        &self,
        host: &dyn HostSystem,
        resource: &ResourceRef,
        write: FieldWrite<'_>,
        scope: &AccessScope,
    ) -> Result<u64, HostError> {
        host.write_field(
            &resource.model,
            &resource.id,
            write.field,
            write.value,
            write.expected_version,
            scope,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

pub struct ViewAdapter;

#[async_trait]
impl ResourceAdapter for ViewAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::View
    }

    async fn resolve(
        &self,
        host: &dyn HostSystem,
        panel: PanelId,
        resource: &ResourceRef,
        scope: &AccessScope,
    ) -> Result<ResourcePanel, HostError> {
        let view = host
            .describe_view(&resource.model, &resource.id, scope)
            .await?;
        Ok(ResourcePanel {
            id: panel,
            resource: resource.clone(),
            title: view.title,
            descriptor: json!({
                "layout": "view",
                "arch": view.arch,
                "rows": view.rows,
            }),
            fields: Default::default(),
            version: 0,
            writable: false,
            acl: PanelAcl {
                read: view.read_groups,
                write: Default::default(),
            },
        })
    }

    async fn apply_field(
        &self,
        _host: &dyn HostSystem,
        resource: &ResourceRef,
        _write: FieldWrite<'_>,
        _scope: &AccessScope,
    ) -> Result<u64, HostError> {
        Err(read_only(resource))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

pub struct ReportAdapter;

#[async_trait]
impl ResourceAdapter for ReportAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Report
    }

    async fn resolve(
        &self,
        host: &dyn HostSystem,
        panel: PanelId,
        resource: &ResourceRef,
        scope: &AccessScope,
    ) -> Result<ResourcePanel, HostError> {
        let report = host
            .render_report(&resource.model, &resource.id, scope)
            .await?;
        Ok(ResourcePanel {
            id: panel,
            resource: resource.clone(),
            title: report.title,
            descriptor: json!({
                "layout": "report",
                "content": report.content,
            }),
            fields: Default::default(),
            version: 0,
            writable: false,
            acl: PanelAcl {
                read: report.read_groups,
                write: Default::default(),
            },
        })
    }

    async fn apply_field(
        &self,
        _host: &dyn HostSystem,
        resource: &ResourceRef,
        _write: FieldWrite<'_>,
        _scope: &AccessScope,
    ) -> Result<u64, HostError> {
        Err(read_only(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryHost;

    fn admin() -> AccessScope {
        AccessScope::new(
            "admin",
            [
                "base.group_user",
                "account.group_account_invoice",
                "sales_team.group_sale_salesman",
            ],
        )
    }

    #[test]
    fn adapter_for_matches_kind() {
        for kind in [ResourceKind::Record, ResourceKind::View, ResourceKind::Report] {
            assert_eq!(adapter_for(kind).kind(), kind);
        }
    }

    #[tokio::test]
    async fn record_resolves_to_writable_form() {
        let host = MemoryHost::demo();
        let resource = ResourceRef::record("account.move", 42);
        let panel = adapter_for(resource.kind)
            .resolve(&host, PanelId::from("invoice-42"), &resource, &admin())
            .await
            .unwrap();
        assert_eq!(panel.title, "INV/2024/0042");
        assert_eq!(panel.version, 1);
        assert!(panel.writable);
        assert_eq!(panel.fields["status"], json!("posted"));
        assert_eq!(panel.descriptor["layout"], "form");
    }

    #[tokio::test]
    async fn view_resolves_read_only() {
        let host = MemoryHost::demo();
        let resource = ResourceRef::view("crm.lead", "kanban");
        let adapter = adapter_for(resource.kind);
        let panel = adapter
            .resolve(&host, PanelId::from("pipeline"), &resource, &admin())
            .await
            .unwrap();
        assert!(!panel.writable);
        assert_eq!(panel.descriptor["rows"].as_array().map(Vec::len), Some(2));

        let value = json!("x");
        let err = adapter
            .apply_field(
                &host,
                &resource,
                FieldWrite {
                    field: "stage",
                    value: &value,
                    expected_version: 0,
                },
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn report_resolves_content() {
        let host = MemoryHost::demo();
        let resource = ResourceRef::report("account.move", "invoice_summary");
        let panel = adapter_for(resource.kind)
            .resolve(&host, PanelId::from("summary"), &resource, &admin())
            .await
            .unwrap();
        assert_eq!(panel.title, "Invoice summary");
        assert_eq!(panel.descriptor["content"]["overdue"], 1);
    }
}
