use std::time::Duration;

use odooxr_common::{
    AccessScope, ClientMode, ConnectionState, Event, EventBus, LeaveReason, RoomId, SessionId,
    UserIdentity,
};
use tokio::time::Instant;

use super::*;

fn registry() -> (PresenceRegistry, EventBus) {
    let events = EventBus::new(64);
    let registry =
        PresenceRegistry::new(Duration::from_secs(15), Duration::from_secs(45), events.clone());
    (registry, events)
}

fn alice() -> UserIdentity {
    UserIdentity::new("alice", "Alice")
}

async fn joined(registry: &PresenceRegistry, user: UserIdentity, room: &str) -> Session {
    let (session, _) = registry
        .register(
            user.clone(),
            RoomId::from(room),
            ClientMode::Immersive,
            AccessScope::new(user.user_id.clone(), ["base.group_user"]),
        )
        .await;
    registry.activate(&session.id).await.unwrap();
    session
}

#[tokio::test]
async fn register_then_activate() {
    let (registry, events) = registry();
    let mut rx = events.subscribe();

    let (session, changes) = registry
        .register(
            alice(),
            RoomId::from("R1"),
            ClientMode::Inline,
            AccessScope::default(),
        )
        .await;
    assert!(changes.is_empty());
    assert_eq!(session.state, ConnectionState::Connecting);

    let change = registry.activate(&session.id).await.unwrap();
    assert_eq!(
        change,
        MembershipChange::Joined {
            session: session.id.clone(),
            room: RoomId::from("R1"),
        }
    );
    assert_eq!(
        registry.get(&session.id).await.unwrap().state,
        ConnectionState::Active
    );
    assert!(matches!(rx.recv().await.unwrap(), Event::SessionJoined { .. }));

    // Activating twice is not a valid transition.
    assert!(registry.activate(&session.id).await.is_err());
}

#[tokio::test]
async fn heartbeat_unknown_session_is_expired() {
    let (registry, _) = registry();
    let err = registry.heartbeat(&SessionId::new()).await.unwrap_err();
    assert!(matches!(err, odooxr_common::OfficeError::ExpiredSession { .. }));
}

#[tokio::test]
async fn same_identity_replaces_previous_session() {
    let (registry, _) = registry();
    let first = joined(&registry, alice(), "R1").await;

    let (second, changes) = registry
        .register(
            alice(),
            RoomId::from("R2"),
            ClientMode::Immersive,
            AccessScope::default(),
        )
        .await;
    assert_eq!(
        changes,
        vec![MembershipChange::Left {
            session: first.id.clone(),
            room: RoomId::from("R1"),
            reason: LeaveReason::Replaced,
        }]
    );
    assert!(first.cancel.is_cancelled());
    assert!(registry.get(&first.id).await.is_none());
    assert_eq!(registry.session_of("alice").await, Some(second.id.clone()));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_marks_stale_then_closes() {
    let (registry, _) = registry();
    let session = joined(&registry, alice(), "R1").await;

    tokio::time::advance(Duration::from_secs(16)).await;
    let changes = registry.sweep(Instant::now()).await;
    assert_eq!(
        changes,
        vec![MembershipChange::Stale {
            session: session.id.clone()
        }]
    );
    assert_eq!(
        registry.get(&session.id).await.unwrap().state,
        ConnectionState::Stale
    );

    // Already stale: nothing new to report.
    assert!(registry.sweep(Instant::now()).await.is_empty());

    tokio::time::advance(Duration::from_secs(30)).await;
    let changes = registry.sweep(Instant::now()).await;
    assert_eq!(
        changes,
        vec![MembershipChange::Left {
            session: session.id.clone(),
            room: RoomId::from("R1"),
            reason: LeaveReason::TimedOut,
        }]
    );
    assert!(registry.get(&session.id).await.is_none());
    assert!(session.cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_revives_stale_session() {
    let (registry, _) = registry();
    let session = joined(&registry, alice(), "R1").await;

    tokio::time::advance(Duration::from_secs(20)).await;
    registry.sweep(Instant::now()).await;

    let change = registry.heartbeat(&session.id).await.unwrap();
    assert_eq!(
        change,
        Some(MembershipChange::Resumed {
            session: session.id.clone()
        })
    );
    assert_eq!(
        registry.get(&session.id).await.unwrap().state,
        ConnectionState::Active
    );
    assert_eq!(registry.heartbeat(&session.id).await.unwrap(), None);

    // The heartbeat reset the clock.
    tokio::time::advance(Duration::from_secs(40)).await;
    assert!(registry.sweep(Instant::now()).await.iter().all(|c| !matches!(c, MembershipChange::Left { .. })));
}

#[tokio::test]
async fn unregister_reports_left_once() {
    let (registry, _) = registry();
    let session = joined(&registry, alice(), "R1").await;

    let change = registry.unregister(&session.id).await;
    assert_eq!(
        change,
        Some(MembershipChange::Left {
            session: session.id.clone(),
            room: RoomId::from("R1"),
            reason: LeaveReason::Left,
        })
    );
    assert!(registry.unregister(&session.id).await.is_none());
    assert!(registry.heartbeat(&session.id).await.is_err());
}

#[tokio::test]
async fn disconnect_cancels_but_keeps_session() {
    let (registry, _) = registry();
    let session = joined(&registry, alice(), "R1").await;

    assert!(registry.disconnect(&session.id).await);
    assert!(session.cancel.is_cancelled());

    let current = registry.get(&session.id).await.unwrap();
    assert!(!current.cancel.is_cancelled());
    assert!(registry.heartbeat(&session.id).await.is_ok());
}
