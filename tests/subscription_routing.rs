//! Subscription Routing Tests
//!
//! Pattern delivery rules, glob writes and session teardown.

use std::sync::Arc;

use katamari::auth::{FilterRules, Operation};
use katamari::realtime::{ChangeBus, ChangeKind, Outbox, ServerMessage, SessionConfig, SessionId};
use katamari::storage::KeyStore;
use katamari::WriteCoordinator;
use serde_json::json;

fn coordinator() -> WriteCoordinator {
    WriteCoordinator::new(
        Arc::new(KeyStore::new()),
        Arc::new(ChangeBus::new(SessionConfig::default())),
        false,
    )
}

fn connect(coordinator: &WriteCoordinator, patterns: &[&str]) -> (SessionId, Outbox) {
    let (session, outbox) = coordinator.bus().sessions().register().unwrap();
    for pattern in patterns {
        coordinator.subscribe(session, pattern).unwrap();
    }
    (session, outbox)
}

/// Keys of every change queued for the session, until the queue closes.
async fn received_keys(coordinator: &WriteCoordinator, session: SessionId, mut outbox: Outbox) -> Vec<String> {
    coordinator.bus().sessions().enqueue(
        session,
        ServerMessage::Pong {
            id: Some("end".into()),
        },
    );

    let mut keys = Vec::new();
    while let Some(message) = outbox.next().await {
        match message {
            ServerMessage::Change { event } => keys.push(event.key),
            ServerMessage::Pong { .. } => break,
            _ => {}
        }
    }
    keys
}

#[tokio::test]
async fn test_single_and_recursive_wildcards() {
    let coordinator = coordinator();
    let (single, single_out) = connect(&coordinator, &["rooms/*"]);
    let (recursive, recursive_out) = connect(&coordinator, &["rooms/**"]);

    coordinator.replace("rooms/1", json!({})).unwrap();
    coordinator.replace("rooms/1/users/x", json!({})).unwrap();
    coordinator.replace("rooms", json!({})).unwrap();
    coordinator.replace("lobby/1", json!({})).unwrap();

    assert_eq!(
        received_keys(&coordinator, single, single_out).await,
        vec!["rooms/1"]
    );
    assert_eq!(
        received_keys(&coordinator, recursive, recursive_out).await,
        vec!["rooms/1", "rooms/1/users/x"]
    );
}

#[tokio::test]
async fn test_many_subscribers_each_get_one_copy() {
    let coordinator = coordinator();
    let sessions: Vec<(SessionId, Outbox)> = (0..20)
        .map(|_| connect(&coordinator, &["feed/*", "feed/**"]))
        .collect();

    let result_key = coordinator.patch("feed/*", json!({"msg": "hi"})).unwrap().key;

    for (session, outbox) in sessions {
        assert_eq!(
            received_keys(&coordinator, session, outbox).await,
            vec![result_key.clone()]
        );
    }
}

#[tokio::test]
async fn test_glob_delete_publishes_per_key() {
    let coordinator = coordinator();
    coordinator.replace("things/a", json!(1)).unwrap();
    coordinator.replace("things/b", json!(2)).unwrap();
    coordinator.replace("things/b/c", json!(3)).unwrap();
    let (session, mut outbox) = connect(&coordinator, &["things/**"]);

    assert_eq!(coordinator.delete("things/*").unwrap(), 2);

    let mut deleted = Vec::new();
    for _ in 0..2 {
        match outbox.next().await {
            Some(ServerMessage::Change { event }) => {
                assert_eq!(event.kind, ChangeKind::Deleted);
                assert!(event.value.is_null());
                deleted.push(event.key);
            }
            other => panic!("expected change, got {:?}", other),
        }
    }
    deleted.sort();
    assert_eq!(deleted, vec!["things/a", "things/b"]);
    assert!(coordinator.store().get("things/b/c").unwrap().is_some());
    coordinator.bus().sessions().deregister(session);
}

/// A session that disconnects between a write and its delivery is simply
/// skipped; writers and other sessions are unaffected.
#[tokio::test]
async fn test_disconnect_mid_flight() {
    let coordinator = coordinator();
    let (leaving, leaving_out) = connect(&coordinator, &["chat/*"]);
    let (staying, staying_out) = connect(&coordinator, &["chat/*"]);

    coordinator.replace("chat/1", json!({"n": 1})).unwrap();
    coordinator.bus().sessions().deregister(leaving);
    drop(leaving_out);
    coordinator.replace("chat/1", json!({"n": 2})).unwrap();

    assert!(coordinator.bus().index().matching_sessions("chat/1").len() == 1);
    assert_eq!(
        received_keys(&coordinator, staying, staying_out).await,
        vec!["chat/1", "chat/1"]
    );
    assert_eq!(coordinator.store().get("chat/1").unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn test_slow_consumer_is_evicted_without_blocking_writer() {
    let coordinator = WriteCoordinator::new(
        Arc::new(KeyStore::new()),
        Arc::new(ChangeBus::new(SessionConfig {
            queue_capacity: 4,
            max_subscriptions: 10,
        })),
        false,
    );
    let (slow, mut slow_out) = connect(&coordinator, &["ticks"]);

    for n in 0..100 {
        coordinator.replace("ticks", json!(n)).unwrap();
    }

    assert!(!coordinator.bus().sessions().contains(slow));
    assert!(coordinator.bus().index().is_empty());
    assert_eq!(slow_out.next().await, None);
    assert_eq!(coordinator.store().get("ticks").unwrap().unwrap().version, 100);
}

#[tokio::test]
async fn test_changes_to_unreadable_keys_are_not_delivered() {
    let rules = FilterRules::new()
        .deny("private/**", Operation::Read)
        .unwrap();
    let coordinator = coordinator().with_filter(Arc::new(rules));
    let (watcher, watcher_out) = connect(&coordinator, &["**"]);

    coordinator.replace("private/secret", json!({"pin": 1234})).unwrap();
    coordinator.replace("public/notice", json!({"text": "hi"})).unwrap();
    coordinator.delete("private/secret").unwrap();

    assert!(coordinator.read("private/secret").is_err());
    assert_eq!(
        received_keys(&coordinator, watcher, watcher_out).await,
        vec!["public/notice"]
    );
}
