use std::sync::Arc;
use std::time::Duration;

use odooxr_common::{
    ClientMode, LeaveReason, OfficeError, PanelId, RoomId, SessionId, Transform, UserIdentity,
};
use odooxr_config::OfficeConfig;
use serde_json::json;

use super::*;
use crate::bridge::MemoryHost;
use crate::protocol::{DeltaBody, ResourceRef, SyncMessage};

fn office() -> (Arc<Office>, Arc<MemoryHost>) {
    let host = Arc::new(MemoryHost::demo());
    let office = Arc::new(Office::new(&OfficeConfig::default(), host.clone()));
    (office, host)
}

fn admin() -> UserIdentity {
    UserIdentity::new("admin", "Mitchell Admin")
}

fn accountant() -> UserIdentity {
    UserIdentity::new("accountant", "Beth Accountant")
}

fn r1() -> RoomId {
    RoomId::from("R1")
}

async fn expect_snapshot(sub: &mut Subscription) -> RoomSnapshot {
    match sub.next().await {
        Some(SyncMessage::Snapshot(s)) => s,
        other => panic!("expected snapshot, got {other:?}"),
    }
}

async fn expect_delta(sub: &mut Subscription) -> Delta {
    match sub.next().await {
        Some(SyncMessage::Delta(d)) => d,
        other => panic!("expected delta, got {other:?}"),
    }
}

#[tokio::test]
async fn join_returns_snapshot_with_self() {
    let (office, _) = office();
    let mut ticket = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();
    assert_eq!(ticket.room, r1());

    let snapshot = expect_snapshot(&mut ticket.subscription).await;
    let me = snapshot.member(&ticket.session).unwrap();
    assert_eq!(me.user, admin());
    assert_eq!(me.mode, ClientMode::Immersive);
    assert_eq!(snapshot.seq, 1);
}

#[tokio::test]
async fn blank_room_is_invalid() {
    let (office, _) = office();
    let err = office
        .join(RoomId::from("  "), admin(), ClientMode::Inline)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, OfficeError::InvalidRoom { .. }));
}

#[tokio::test]
async fn late_joiner_sees_presence_in_snapshot() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();
    office
        .submit(
            &a.session,
            ClientDelta::Presence {
                transform: Transform::at(1.0, 0.0, 0.0),
            },
        )
        .await
        .unwrap();

    let mut b = office
        .join(r1(), accountant(), ClientMode::Inline)
        .await
        .unwrap();
    let snapshot = expect_snapshot(&mut b.subscription).await;
    assert_eq!(
        snapshot.member(&a.session).unwrap().transform,
        Transform::at(1.0, 0.0, 0.0)
    );

    // B's stream continues right after the snapshot, not with A's move.
    office
        .submit(&a.session, ClientDelta::Focus { panel: None })
        .await
        .unwrap();
    let next = expect_delta(&mut b.subscription).await;
    assert_eq!(next.seq, snapshot.seq + 1);
    assert!(matches!(next.body, DeltaBody::Focus { .. }));
}

#[tokio::test]
async fn invoice_paid_while_colleague_edits_conflicts() {
    let (office, host) = office();
    host.grant("accountant", ["account.group_account_invoice"]).await;

    let a = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();
    let b = office.join(r1(), accountant(), ClientMode::Inline).await.unwrap();
    office
        .submit(
            &a.session,
            ClientDelta::OpenPanel {
                panel: PanelId::from("invoice-42"),
                resource: ResourceRef::record("account.move", 42),
            },
        )
        .await
        .unwrap();
    let n = office.log(&r1()).await.unwrap().len() as u64 + 1;

    host.hold_writes();
    let paying = {
        let office = office.clone();
        let session = a.session.clone();
        tokio::spawn(async move {
            office
                .submit(
                    &session,
                    ClientDelta::UpdateField {
                        panel: PanelId::from("invoice-42"),
                        field: "status".into(),
                        value: json!("paid"),
                        expected_version: Some(1),
                    },
                )
                .await
        })
    };
    while host.writes_waiting() == 0 {
        tokio::task::yield_now().await;
    }

    let err = office
        .submit(
            &b.session,
            ClientDelta::UpdateField {
                panel: PanelId::from("invoice-42"),
                field: "status".into(),
                value: json!("cancel"),
                expected_version: Some(1),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfficeError::Conflict { .. }));

    host.release_writes();
    let accepted = paying.await.unwrap().unwrap();
    assert_eq!(accepted.seq, n);

    let snapshot = office.snapshot(&r1()).await.unwrap();
    let panel = snapshot.panel(&PanelId::from("invoice-42")).unwrap();
    assert_eq!(panel.fields["status"], json!("paid"));
    assert_eq!(panel.version, 2);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout_broadcasts_leave_at_next_seq() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();
    let mut b = office
        .join(r1(), accountant(), ClientMode::Inline)
        .await
        .unwrap();
    let snapshot = expect_snapshot(&mut b.subscription).await;

    tokio::time::advance(Duration::from_secs(20)).await;
    office.heartbeat(&b.session).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;

    let report = office.sweep().await;
    assert_eq!(report.timed_out, vec![a.session.clone()]);
    assert!(report.torn_down.is_empty());

    let leave = expect_delta(&mut b.subscription).await;
    assert_eq!(leave.seq, snapshot.seq + 1);
    assert_eq!(leave.origin, None);
    assert_eq!(
        leave.body,
        DeltaBody::MemberLeft {
            session: a.session.clone(),
            reason: LeaveReason::TimedOut,
        }
    );

    let err = office.heartbeat(&a.session).await.unwrap_err();
    assert!(matches!(err, OfficeError::ExpiredSession { .. }));
}

#[tokio::test(start_paused = true)]
async fn stale_session_recovers_on_submit() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();

    tokio::time::advance(Duration::from_secs(20)).await;
    let report = office.sweep().await;
    assert_eq!(report.stale, vec![a.session.clone()]);

    office
        .submit(&a.session, ClientDelta::Focus { panel: None })
        .await
        .unwrap();
    let session = office.session(&a.session).await.unwrap();
    assert_eq!(session.state, odooxr_common::ConnectionState::Active);
}

#[tokio::test(start_paused = true)]
async fn empty_room_torn_down_after_grace() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Inline).await.unwrap();
    office.leave(&a.session).await.unwrap();
    assert_eq!(office.rooms().await, vec![r1()]);

    tokio::time::advance(Duration::from_secs(31)).await;
    let report = office.sweep().await;
    assert_eq!(report.torn_down, vec![r1()]);
    assert!(office.rooms().await.is_empty());
}

#[tokio::test]
async fn rejoin_replaces_previous_session() {
    let (office, _) = office();
    let mut first = office.join(r1(), admin(), ClientMode::Inline).await.unwrap();
    expect_snapshot(&mut first.subscription).await;

    let second = office
        .join(RoomId::from("R2"), admin(), ClientMode::Immersive)
        .await
        .unwrap();

    let left = expect_delta(&mut first.subscription).await;
    assert_eq!(
        left.body,
        DeltaBody::MemberLeft {
            session: first.session.clone(),
            reason: LeaveReason::Replaced,
        }
    );
    assert!(first.subscription.next().await.is_none());

    assert!(office.session(&first.session).await.is_none());
    let session = office.session(&second.session).await.unwrap();
    assert_eq!(session.room, RoomId::from("R2"));
    assert!(office.snapshot(&r1()).await.unwrap().members.is_empty());
}

#[tokio::test]
async fn resume_after_disconnect() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Immersive).await.unwrap();
    let old_cancel = office.session(&a.session).await.unwrap().cancel;

    assert!(office.disconnect(&a.session).await);
    assert!(old_cancel.is_cancelled());

    let mut sub = office.resume(&a.session).await.unwrap();
    let snapshot = expect_snapshot(&mut sub).await;
    assert!(snapshot.member(&a.session).is_some());

    office
        .submit(&a.session, ClientDelta::Focus { panel: None })
        .await
        .unwrap();
    assert_eq!(expect_delta(&mut sub).await.seq, snapshot.seq + 1);
}

#[tokio::test]
async fn leave_then_everything_is_expired() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Inline).await.unwrap();
    office.leave(&a.session).await.unwrap();

    assert!(matches!(
        office.leave(&a.session).await,
        Err(OfficeError::ExpiredSession { .. })
    ));
    assert!(matches!(
        office.submit(&a.session, ClientDelta::Focus { panel: None }).await,
        Err(OfficeError::ExpiredSession { .. })
    ));
    assert!(office.resume(&a.session).await.is_err());
    assert!(office.resume(&SessionId::new()).await.is_err());
}

#[tokio::test]
async fn hydrate_uses_session_scope() {
    let (office, _) = office();
    let a = office.join(r1(), admin(), ClientMode::Inline).await.unwrap();
    office
        .submit(
            &a.session,
            ClientDelta::OpenPanel {
                panel: PanelId::from("pipeline"),
                resource: ResourceRef::view("crm.lead", "kanban"),
            },
        )
        .await
        .unwrap();

    let panel = office
        .hydrate(&a.session, &PanelId::from("pipeline"))
        .await
        .unwrap();
    assert_eq!(panel.title, "Pipeline");
    assert!(!panel.writable);
}

#[tokio::test(start_paused = true)]
async fn session_replaced_before_entering_leaves_no_member() {
    let (office, _) = office();
    let scope = office.bridge.scope_for(&admin()).await.unwrap();

    // Two joins by the same user interleave: the second registers before
    // the first reaches its room.
    let (first, _) = office
        .registry
        .register(admin(), r1(), ClientMode::Immersive, scope.clone())
        .await;
    let (second, replaced) = office
        .registry
        .register(admin(), r1(), ClientMode::Inline, scope)
        .await;
    office.apply_changes(replaced).await;

    let err = office.enter(first.clone()).await.err().unwrap();
    assert!(matches!(err, OfficeError::ExpiredSession { .. }));
    let snapshot = office.snapshot(&r1()).await.unwrap();
    assert!(snapshot.member(&first.id).is_none());

    let mut ticket = office.enter(second).await.unwrap();
    let snapshot = expect_snapshot(&mut ticket.subscription).await;
    assert_eq!(snapshot.members.len(), 1);

    // Once the survivor leaves, nothing keeps the room alive.
    office.leave(&ticket.session).await.unwrap();
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(office.sweep().await.torn_down, vec![r1()]);
}
