//! Unit tests for `WsManager`.
//!
//! These tests exercise the WebSocket connection manager directly, without
//! performing any HTTP upgrades. They verify add/remove semantics, broadcast
//! delivery, stale-connection cleanup, and graceful shutdown behaviour.

use std::time::Duration;

use axum::extract::ws::Message;
use gifpress_api::ws::WsManager;

// ---------------------------------------------------------------------------
// Test: new manager starts with zero connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: add() / remove() maintain the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_update_connection_count() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".to_string()).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: send_to() targets one connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_reaches_only_target() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    assert!(manager.send_to("conn-1", Message::Text("hi".into())).await);
    assert!(!manager.send_to("ghost", Message::Text("hi".into())).await);

    let msg = rx1.recv().await.expect("conn-1 should receive");
    assert!(matches!(&msg, Message::Text(t) if *t == "hi"));
    assert!(rx2.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: broadcast() sends message to all connected clients
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_sends_to_all_connections() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;
    let mut rx3 = manager.add("conn-3".to_string()).await;

    let payload = Message::Text("hello everyone".into());
    manager.broadcast(payload).await;

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let msg = rx.recv().await.expect("should receive broadcast");
        assert!(matches!(&msg, Message::Text(t) if *t == "hello everyone"));
    }
}

#[tokio::test]
async fn broadcast_skips_closed_channels() {
    let manager = WsManager::new();

    let rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    // Drop rx1 to close its channel.
    drop(rx1);

    // Broadcast should not panic even though conn-1's channel is closed.
    let payload = Message::Text("still alive".into());
    manager.broadcast(payload).await;

    let msg = rx2.recv().await.expect("conn-2 should receive broadcast");
    assert!(matches!(&msg, Message::Text(t) if *t == "still alive"));
}

// ---------------------------------------------------------------------------
// Test: close_stale() removes silent connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_stale_removes_silent_connections() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("quiet".to_string()).await;
    let _rx2 = manager.add("chatty".to_string()).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.record_activity("chatty").await;

    let closed = manager.close_stale(Duration::from_millis(20)).await;
    assert_eq!(closed, 1);
    assert_eq!(manager.connection_count().await, 1);

    // The stale connection received a Close frame.
    let msg = rx1.recv().await.expect("quiet should receive Close");
    assert!(matches!(msg, Message::Close(None)));
}

#[tokio::test]
async fn close_stale_keeps_fresh_connections() {
    let manager = WsManager::new();

    let _rx = manager.add("fresh".to_string()).await;
    let closed = manager.close_stale(Duration::from_secs(60)).await;

    assert_eq!(closed, 0);
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);

    for rx in [&mut rx1, &mut rx2] {
        let msg = rx.recv().await.expect("should receive Close");
        assert!(
            matches!(msg, Message::Close(None)),
            "Expected Close(None), got: {msg:?}"
        );
        // After Close, the channel should be closed (no more messages).
        assert!(rx.recv().await.is_none());
    }
}

// ---------------------------------------------------------------------------
// Test: adding with duplicate ID replaces the previous connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_id_replaces_previous_connection() {
    let manager = WsManager::new();

    let _rx_old = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    // Re-add with the same ID -- should replace, not duplicate.
    let mut rx_new = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.broadcast(Message::Text("replaced".into())).await;
    let msg = rx_new.recv().await.expect("new rx should receive message");
    assert!(matches!(&msg, Message::Text(t) if *t == "replaced"));
}
