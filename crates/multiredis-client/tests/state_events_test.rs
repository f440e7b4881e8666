//! Aggregate State and Event Integration Tests
//!
//! Verifies that child lifecycle events:
//! - are re-emitted on the fan-out client, once per emitting child
//! - keep `connected` / `all_connected` / `server_info` current
//! - produce a single `all-ready` once every child is connected and ready

use multiredis_client::{ConnectionEvent, ConnectionPhase, FanoutConfig, FanoutEvent, MemoryConnection};
use multiredis_common::ServerInfo;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

mod common;
use common::client;

fn offline(name: &str) -> Arc<MemoryConnection> {
    let child = Arc::new(MemoryConnection::new(name));
    child.set_connected(false);
    child.set_ready(false);
    child
}

async fn next_event(events: &mut broadcast::Receiver<FanoutEvent>) -> FanoutEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Event channel closed")
}

/// Lets the fan-in tasks drain anything still queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_child_events_are_proxied() {
    let a = offline("a");
    let b = offline("b");
    let client = client(&[a.clone(), b.clone()], FanoutConfig::default());
    let mut events = client.subscribe();

    b.emit(ConnectionEvent::Warning("slow".to_string()));
    assert_eq!(
        next_event(&mut events).await,
        FanoutEvent::Child {
            index: 1,
            event: ConnectionEvent::Warning("slow".to_string()),
        }
    );

    a.emit(ConnectionEvent::Message {
        channel: "news".to_string(),
        payload: "hello".to_string(),
    });
    match next_event(&mut events).await {
        FanoutEvent::Child { index, event } => {
            assert_eq!(index, 0);
            assert_eq!(event.name(), "message");
            assert_eq!(
                event,
                ConnectionEvent::Message {
                    channel: "news".to_string(),
                    payload: "hello".to_string(),
                }
            );
        }
        other => panic!("Expected a child event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_same_event_from_every_child_is_not_deduplicated() {
    let children: Vec<_> = (0..3).map(|i| offline(&format!("c{}", i))).collect();
    let client = client(&children, FanoutConfig::default());
    let mut events = client.subscribe();

    for child in &children {
        child.emit(ConnectionEvent::Subscribe {
            channel: "news".to_string(),
            count: 1,
        });
    }

    let mut indexes = Vec::new();
    for _ in 0..3 {
        match next_event(&mut events).await {
            FanoutEvent::Child { index, event } => {
                assert_eq!(event.name(), "subscribe");
                indexes.push(index);
            }
            other => panic!("Expected a child event, got {:?}", other),
        }
    }
    indexes.sort();
    assert_eq!(indexes, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_connect_and_end_update_state() {
    let a = offline("a");
    let b = offline("b");
    let client = client(&[a.clone(), b.clone()], FanoutConfig::default());
    let mut state = client.state_changes();
    assert_eq!(client.state().phase(), ConnectionPhase::Disconnected);

    a.connect();
    state.wait_for(|s| s.connected).await.unwrap();
    assert!(client.connected());
    assert!(!client.all_connected());
    assert_eq!(client.state().phase(), ConnectionPhase::PartiallyConnected);

    b.connect();
    client.wait_all_connected().await;
    assert_eq!(client.state().phase(), ConnectionPhase::FullyConnected);

    a.disconnect();
    b.disconnect();
    state.wait_for(|s| !s.connected).await.unwrap();
    assert!(!client.all_connected());
}

#[tokio::test]
async fn test_error_event_triggers_recompute() {
    let a = offline("a");
    let client = client(&[a.clone()], FanoutConfig::default());
    let mut state = client.state_changes();

    // Flags flipped without an event are not observed until something recomputes.
    a.set_connected(true);
    settle().await;
    assert!(!client.connected());

    a.emit(ConnectionEvent::Error("ECONNRESET".to_string()));
    state.wait_for(|s| s.connected).await.unwrap();
    assert!(client.connected());
}

#[tokio::test]
async fn test_server_info_follows_first_connected_child() {
    let a = offline("a");
    let b = offline("b");
    a.set_server_info(Some(ServerInfo::parse("# Server\r\nredis_version:6.2.0\r\n")));
    b.set_server_info(Some(ServerInfo::parse("# Server\r\nredis_version:7.2.4\r\n")));
    let client = client(&[a.clone(), b.clone()], FanoutConfig::default());
    let mut state = client.state_changes();
    assert!(client.server_info().is_none());

    b.connect();
    state.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(
        client.server_info().and_then(|i| i.redis_version().map(String::from)),
        Some("7.2.4".to_string())
    );

    a.connect();
    state.wait_for(|s| s.all_connected).await.unwrap();
    assert_eq!(
        client.server_info().and_then(|i| i.redis_version().map(String::from)),
        Some("6.2.0".to_string())
    );

    a.disconnect();
    b.disconnect();
    state.wait_for(|s| !s.connected).await.unwrap();
    assert!(client.server_info().is_none());
}

#[tokio::test]
async fn test_all_ready_waits_for_every_child() {
    let a = offline("a");
    let b = offline("b");
    let client = client(&[a.clone(), b.clone()], FanoutConfig::default());
    let mut events = client.subscribe();

    // B connected but still loading.
    b.connect();
    assert_eq!(
        next_event(&mut events).await,
        FanoutEvent::Child { index: 1, event: ConnectionEvent::Connect }
    );

    a.make_ready();
    assert_eq!(
        next_event(&mut events).await,
        FanoutEvent::Child { index: 0, event: ConnectionEvent::Ready }
    );
    assert!(client.all_connected());

    b.make_ready();
    assert_eq!(
        next_event(&mut events).await,
        FanoutEvent::Child { index: 1, event: ConnectionEvent::Ready }
    );
    assert_eq!(next_event(&mut events).await, FanoutEvent::AllReady);

    settle().await;
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_all_ready_again_after_reconnect() {
    let a = offline("a");
    let client = client(&[a.clone()], FanoutConfig::default());
    let mut events = client.subscribe();

    a.make_ready();
    next_event(&mut events).await;
    assert_eq!(next_event(&mut events).await, FanoutEvent::AllReady);

    a.disconnect();
    assert_eq!(
        next_event(&mut events).await,
        FanoutEvent::Child { index: 0, event: ConnectionEvent::End }
    );

    a.make_ready();
    next_event(&mut events).await;
    assert_eq!(next_event(&mut events).await, FanoutEvent::AllReady);
}

#[tokio::test]
async fn test_wait_all_ready() {
    let a = offline("a");
    let b = offline("b");
    let client = client(&[a.clone(), b.clone()], FanoutConfig::default());

    let waiter = tokio::spawn({
        let client = client.clone();
        async move { client.wait_all_ready().await }
    });

    a.make_ready();
    settle().await;
    assert!(!waiter.is_finished());

    b.make_ready();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("all-ready never arrived")
        .unwrap();
}

#[tokio::test]
async fn test_recompute_state_without_events() {
    let a = offline("a");
    let client = client(&[a.clone()], FanoutConfig::default());
    let mut events = client.subscribe();

    a.set_connected(true);
    a.set_ready(true);
    client.recompute_state(false);
    assert!(client.all_connected());
    settle().await;
    assert!(events.try_recv().is_err());

    client.recompute_state(true);
    assert_eq!(next_event(&mut events).await, FanoutEvent::AllReady);
}
