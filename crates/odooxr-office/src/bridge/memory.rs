//! In-process host used by tests and the demo deployment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use odooxr_common::{AccessScope, UserIdentity};
use serde_json::json;
use tokio::sync::{watch, RwLock};

use super::host::{HostError, HostRecord, HostReport, HostSystem, HostView};

type Key = (String, String);

fn key(model: &str, id: &str) -> Key {
    (model.to_string(), id.to_string())
}

fn groups<const N: usize>(names: [&str; N]) -> BTreeSet<String> {
    names.iter().map(|g| g.to_string()).collect()
}

#[derive(Default)]
struct HostState {
    records: HashMap<Key, HostRecord>,
    views: HashMap<Key, HostView>,
    reports: HashMap<Key, HostReport>,
    users: HashMap<String, BTreeSet<String>>,
}

/// A host backed by in-memory maps.
///
/// Besides plain storage it can simulate an outage (`set_available(false)`)
/// and hold writes at the door (`hold_writes`) so callers can observe
/// in-flight behavior.
pub struct MemoryHost {
    state: RwLock<HostState>,
    default_groups: BTreeSet<String>,
    available: AtomicBool,
    writes_open: watch::Sender<bool>,
    writes_waiting: AtomicUsize,
}

impl MemoryHost {
    pub fn new<I, S>(default_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (writes_open, _) = watch::channel(true);
        Self {
            state: RwLock::new(HostState::default()),
            default_groups: default_groups.into_iter().map(Into::into).collect(),
            available: AtomicBool::new(true),
            writes_open,
            writes_waiting: AtomicUsize::new(0),
        }
    }

    /// Host seeded with a small sales/accounting data set.
    pub fn demo() -> Self {
        let mut host = Self::new(["base.group_user"]);
        let state = host.state.get_mut();

        state.users.insert(
            "admin".into(),
            groups([
                "base.group_user",
                "base.group_partner_manager",
                "account.group_account_invoice",
                "sales_team.group_sale_salesman",
            ]),
        );
        state.users.insert(
            "demo".into(),
            groups(["base.group_user", "sales_team.group_sale_salesman"]),
        );

        for record in [
            HostRecord {
                model: "account.move".into(),
                id: "42".into(),
                display_name: "INV/2024/0042".into(),
                fields: BTreeMap::from([
                    ("partner".into(), json!("Azure Interior")),
                    ("amount_total".into(), json!(1250.0)),
                    ("currency".into(), json!("EUR")),
                    ("status".into(), json!("posted")),
                ]),
                version: 1,
                read_groups: groups(["account.group_account_invoice"]),
                write_groups: groups(["account.group_account_invoice"]),
                readonly_fields: groups(["amount_total", "currency"]),
            },
            HostRecord {
                model: "res.partner".into(),
                id: "7".into(),
                display_name: "Azure Interior".into(),
                fields: BTreeMap::from([
                    ("email".into(), json!("azure.interior24@example.com")),
                    ("phone".into(), json!("+1 555-0107")),
                    ("city".into(), json!("Fremont")),
                ]),
                version: 1,
                read_groups: BTreeSet::new(),
                write_groups: groups(["base.group_partner_manager"]),
                readonly_fields: BTreeSet::new(),
            },
            HostRecord {
                model: "crm.lead".into(),
                id: "3".into(),
                display_name: "Office furniture for the new floor".into(),
                fields: BTreeMap::from([
                    ("stage".into(), json!("qualified")),
                    ("expected_revenue".into(), json!(24000)),
                    ("probability".into(), json!(40)),
                ]),
                version: 1,
                read_groups: groups(["sales_team.group_sale_salesman"]),
                write_groups: groups(["sales_team.group_sale_salesman"]),
                readonly_fields: BTreeSet::new(),
            },
        ] {
            state
                .records
                .insert(key(&record.model, &record.id), record);
        }

        state.views.insert(
            key("crm.lead", "kanban"),
            HostView {
                model: "crm.lead".into(),
                view_id: "kanban".into(),
                title: "Pipeline".into(),
                arch: json!({ "type": "kanban", "group_by": "stage" }),
                rows: vec![
                    json!({ "id": 3, "name": "Office furniture for the new floor", "stage": "qualified" }),
                    json!({ "id": 5, "name": "Meeting pods", "stage": "new" }),
                ],
                read_groups: groups(["sales_team.group_sale_salesman"]),
            },
        );

        state.reports.insert(
            key("account.move", "invoice_summary"),
            HostReport {
                model: "account.move".into(),
                report_id: "invoice_summary".into(),
                title: "Invoice summary".into(),
                content: json!({ "open": 3, "overdue": 1, "total_due": 4310.5 }),
                read_groups: groups(["account.group_account_invoice"]),
            },
        );

        host
    }

    pub async fn insert_record(&self, record: HostRecord) {
        let mut state = self.state.write().await;
        state
            .records
            .insert(key(&record.model, &record.id), record);
    }

    pub async fn remove_record(&self, model: &str, id: &str) -> Option<HostRecord> {
        self.state.write().await.records.remove(&key(model, id))
    }

    pub async fn record(&self, model: &str, id: &str) -> Option<HostRecord> {
        self.state.read().await.records.get(&key(model, id)).cloned()
    }

    pub async fn insert_view(&self, view: HostView) {
        let mut state = self.state.write().await;
        state.views.insert(key(&view.model, &view.view_id), view);
    }

    pub async fn grant<I, S>(&self, user_id: &str, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write().await;
        state
            .users
            .entry(user_id.to_string())
            .or_default()
            .extend(groups.into_iter().map(Into::into));
    }

    /// Simulate the host going down (every call fails with `Unavailable`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Park every `write_field` call until `release_writes`.
    pub fn hold_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.writes_open.send_replace(true);
    }

    /// Number of writes currently parked by `hold_writes`.
    pub fn writes_waiting(&self) -> usize {
        self.writes_waiting.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), HostError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HostError::Unavailable("memory host is offline".into()))
        }
    }

    async fn wait_for_write_slot(&self) {
        let mut open = self.writes_open.subscribe();
        if *open.borrow_and_update() {
            return;
        }
        self.writes_waiting.fetch_add(1, Ordering::SeqCst);
        loop {
            if open.changed().await.is_err() || *open.borrow_and_update() {
                break;
            }
        }
        self.writes_waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

fn ensure_read(
    read_groups: &BTreeSet<String>,
    scope: &AccessScope,
    what: &str,
) -> Result<(), HostError> {
    if scope.satisfies(read_groups) {
        Ok(())
    } else {
        Err(HostError::AccessDenied(format!(
            "user {} may not read {what}",
            scope.user_id
        )))
    }
}

#[async_trait]
impl HostSystem for MemoryHost {
    async fn scope_for(&self, user: &UserIdentity) -> Result<AccessScope, HostError> {
        self.check_available()?;
        let state = self.state.read().await;
        let groups = state
            .users
            .get(&user.user_id)
            .cloned()
            .unwrap_or_else(|| self.default_groups.clone());
        Ok(AccessScope {
            user_id: user.user_id.clone(),
            groups,
        })
    }

    async fn read_record(
        &self,
        model: &str,
        id: &str,
        scope: &AccessScope,
    ) -> Result<HostRecord, HostError> {
        self.check_available()?;
        let state = self.state.read().await;
        let record = state
            .records
            .get(&key(model, id))
            .ok_or_else(|| HostError::NotFound(format!("{model}/{id}")))?;
        ensure_read(&record.read_groups, scope, &format!("{model}/{id}"))?;
        Ok(record.clone())
    }

    async fn write_field(
        &self,
        model: &str,
        id: &str,
        field: &str,
        value: &serde_json::Value,
        expected_version: u64,
        scope: &AccessScope,
    ) -> Result<u64, HostError> {
        self.check_available()?;
        self.wait_for_write_slot().await;
        self.check_available()?;

        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(&key(model, id))
            .ok_or_else(|| HostError::NotFound(format!("{model}/{id}")))?;

        ensure_read(&record.read_groups, scope, &format!("{model}/{id}"))?;
        if !scope.satisfies(&record.write_groups) {
            return Err(HostError::AccessDenied(format!(
                "user {} may not write {model}/{id}",
                scope.user_id
            )));
        }
        if record.readonly_fields.contains(field) || !record.fields.contains_key(field) {
            return Err(HostError::ReadOnlyField(field.to_string()));
        }
        if record.version != expected_version {
            return Err(HostError::VersionMismatch {
                expected: expected_version,
                actual: record.version,
            });
        }

        record.fields.insert(field.to_string(), value.clone());
        record.version += 1;
        Ok(record.version)
    }

    async fn describe_view(
        &self,
        model: &str,
        view_id: &str,
        scope: &AccessScope,
    ) -> Result<HostView, HostError> {
        self.check_available()?;
        let state = self.state.read().await;
        let view = state
            .views
            .get(&key(model, view_id))
            .ok_or_else(|| HostError::NotFound(format!("view {model}/{view_id}")))?;
        ensure_read(&view.read_groups, scope, &format!("view {model}/{view_id}"))?;
        Ok(view.clone())
    }

    async fn render_report(
        &self,
        model: &str,
        report_id: &str,
        scope: &AccessScope,
    ) -> Result<HostReport, HostError> {
        self.check_available()?;
        let state = self.state.read().await;
        let report = state
            .reports
            .get(&key(model, report_id))
            .ok_or_else(|| HostError::NotFound(format!("report {model}/{report_id}")))?;
        ensure_read(
            &report.read_groups,
            scope,
            &format!("report {model}/{report_id}"),
        )?;
        Ok(report.clone())
    }
}
