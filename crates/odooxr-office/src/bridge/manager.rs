//! Resource bridge: the only path from rooms to the host.

use std::sync::Arc;
use std::time::Duration;

use odooxr_common::{AccessScope, OfficeError, PanelId, UserIdentity};
use odooxr_config::schema::BridgeConfig;
use tracing::{debug, warn};

use crate::protocol::{ResourcePanel, ResourceRef};

use super::adapters::{adapter_for, FieldWrite};
use super::host::{HostError, HostSystem};
use super::locks::PanelLocks;

pub struct ResourceBridge {
    host: Arc<dyn HostSystem>,
    locks: PanelLocks,
    host_timeout: Duration,
}

impl ResourceBridge {
    pub fn new(host: Arc<dyn HostSystem>, host_timeout: Duration) -> Self {
        Self {
            host,
            locks: PanelLocks::new(),
            host_timeout,
        }
    }

    pub fn from_config(host: Arc<dyn HostSystem>, config: &BridgeConfig) -> Self {
        Self::new(host, config.host_timeout())
    }

    pub fn locks(&self) -> &PanelLocks {
        &self.locks
    }

    /// Ask the host what `user` may see and do.
    pub async fn scope_for(&self, user: &UserIdentity) -> Result<AccessScope, OfficeError> {
        let what = format!("user {}", user.user_id);
        match tokio::time::timeout(self.host_timeout, self.host.scope_for(user)).await {
            Ok(result) => result.map_err(|e| map_host_error(&what, e)),
            Err(_) => Err(timed_out(&what)),
        }
    }

    /// Fetch the current host data for `resource` as a panel.
    pub async fn resolve(
        &self,
        panel: PanelId,
        resource: &ResourceRef,
        scope: &AccessScope,
    ) -> Result<ResourcePanel, OfficeError> {
        let what = resource.to_string();
        let adapter = adapter_for(resource.kind);
        let fut = adapter.resolve(self.host.as_ref(), panel, resource, scope);
        match tokio::time::timeout(self.host_timeout, fut).await {
            Ok(result) => result.map_err(|e| map_host_error(&what, e)),
            Err(_) => Err(timed_out(&what)),
        }
    }

    /// Write one field of `panel` through to the host under the resource's
    /// write lock. Returns the host's new version.
    ///
    /// Dropping the returned future releases the lock.
    pub async fn apply(
        &self,
        panel: &ResourcePanel,
        field: &str,
        value: &serde_json::Value,
        scope: &AccessScope,
    ) -> Result<u64, OfficeError> {
        let resource = &panel.resource;
        if !panel.writable {
            return Err(OfficeError::access_denied(format!(
                "{resource} is read-only"
            )));
        }
        if !scope.satisfies(&panel.acl.write) {
            return Err(OfficeError::access_denied(format!(
                "user {} may not write {resource}",
                scope.user_id
            )));
        }

        let _guard = self.locks.try_acquire(resource)?;
        debug!(resource = %resource, field, version = panel.version, "Writing field to host");

        let write = FieldWrite {
            field,
            value,
            expected_version: panel.version,
        };
        let fut = adapter_for(resource.kind).apply_field(self.host.as_ref(), resource, write, scope);
        let what = resource.to_string();
        match tokio::time::timeout(self.host_timeout, fut).await {
            Ok(result) => result.map_err(|e| map_host_error(&what, e)),
            Err(_) => Err(timed_out(&what)),
        }
    }
}

fn timed_out(what: &str) -> OfficeError {
    warn!(resource = what, "Host call timed out");
    OfficeError::unavailable(what)
}

fn map_host_error(what: &str, err: HostError) -> OfficeError {
    match err {
        HostError::NotFound(_) => OfficeError::not_found(what),
        HostError::AccessDenied(reason) => OfficeError::access_denied(reason),
        HostError::ReadOnlyField(field) => {
            OfficeError::access_denied(format!("field {field} of {what} is read-only"))
        }
        HostError::VersionMismatch { actual, .. } => {
            OfficeError::conflict(format!("{what} is now at version {actual}"))
        }
        HostError::Unavailable(reason) => {
            warn!(resource = what, %reason, "Host unavailable");
            OfficeError::unavailable(what)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::bridge::host::{HostRecord, HostReport, HostView};
    use crate::bridge::MemoryHost;

    fn admin() -> AccessScope {
        AccessScope::new("admin", ["base.group_user", "account.group_account_invoice"])
    }

    fn bridge(host: Arc<MemoryHost>) -> ResourceBridge {
        ResourceBridge::new(host, Duration::from_secs(5))
    }

    async fn invoice(bridge: &ResourceBridge) -> ResourcePanel {
        bridge
            .resolve(
                PanelId::from("invoice-42"),
                &ResourceRef::record("account.move", 42),
                &admin(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn apply_writes_through_and_bumps_version() {
        let host = Arc::new(MemoryHost::demo());
        let bridge = bridge(host.clone());
        let panel = invoice(&bridge).await;

        let version = bridge
            .apply(&panel, "status", &json!("paid"), &admin())
            .await
            .unwrap();
        assert_eq!(version, 2);
        let record = host.record("account.move", "42").await.unwrap();
        assert_eq!(record.fields["status"], json!("paid"));
        assert!(!bridge.locks().is_locked(&panel.resource));
    }

    #[tokio::test]
    async fn apply_checks_write_acl_before_host() {
        let host = Arc::new(MemoryHost::demo());
        let bridge = bridge(host.clone());
        let panel = invoice(&bridge).await;

        let reader = AccessScope::new("demo", ["base.group_user"]);
        let err = bridge
            .apply(&panel, "status", &json!("paid"), &reader)
            .await
            .unwrap_err();
        assert!(matches!(err, OfficeError::AccessDenied { .. }));
        assert_eq!(host.record("account.move", "42").await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn stale_panel_version_is_a_conflict() {
        let host = Arc::new(MemoryHost::demo());
        let bridge = bridge(host.clone());
        let mut panel = invoice(&bridge).await;
        bridge
            .apply(&panel, "status", &json!("paid"), &admin())
            .await
            .unwrap();

        panel.version = 1;
        let err = bridge
            .apply(&panel, "status", &json!("cancel"), &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, OfficeError::Conflict { .. }));
    }

    #[tokio::test]
    async fn missing_and_unavailable_are_distinguished() {
        let host = Arc::new(MemoryHost::demo());
        let bridge = bridge(host.clone());
        let missing = ResourceRef::record("account.move", 999);

        let err = bridge
            .resolve(PanelId::from("p"), &missing, &admin())
            .await
            .unwrap_err();
        assert_eq!(err, OfficeError::not_found("record:account.move/999"));
        assert!(!err.is_retryable());

        host.set_available(false);
        let err = bridge
            .resolve(
                PanelId::from("p"),
                &ResourceRef::record("res.partner", 7),
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    struct SlowHost;

    #[async_trait]
    impl HostSystem for SlowHost {
        async fn scope_for(&self, user: &UserIdentity) -> Result<AccessScope, HostError> {
            Ok(AccessScope::new(user.user_id.clone(), Vec::<String>::new()))
        }

        async fn read_record(
            &self,
            model: &str,
            id: &str,
            _scope: &AccessScope,
        ) -> Result<HostRecord, HostError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(HostError::NotFound(format!("{model}/{id}")))
        }

        async fn write_field(
            &self,
            _model: &str,
            _id: &str,
            _field: &str,
            _value: &serde_json::Value,
            _expected_version: u64,
            _scope: &AccessScope,
        ) -> Result<u64, HostError> {
            Err(HostError::Unavailable("slow".into()))
        }

        async fn describe_view(
            &self,
            model: &str,
            view_id: &str,
            _scope: &AccessScope,
        ) -> Result<HostView, HostError> {
            Ok(HostView {
                model: model.into(),
                view_id: view_id.into(),
                title: String::new(),
                arch: json!({}),
                rows: vec![],
                read_groups: BTreeSet::new(),
            })
        }

        async fn render_report(
            &self,
            model: &str,
            _report_id: &str,
            _scope: &AccessScope,
        ) -> Result<HostReport, HostError> {
            Err(HostError::NotFound(model.into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_host_times_out_as_retryable() {
        let bridge = ResourceBridge::new(Arc::new(SlowHost), Duration::from_millis(500));
        let err = bridge
            .resolve(
                PanelId::from("p"),
                &ResourceRef::record("res.partner", 7),
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OfficeError::NotFound { retry: true, .. }));
    }
}
