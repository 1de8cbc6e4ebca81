//! End-to-end session flow tests.
//!
//! Drives a spawned session through a mock transport: handshake, login,
//! subscriptions, message delivery, calls and outbound sends.

mod common;

use std::time::Duration;

use serde_json::json;

use common::{changed_frame, message, start};
use rl_core::error::RlError;
use rl_models::{Credential, Room, RoomKind};
use rl_realtime::{ChannelKind, SessionEvent, SessionState};

// ---- Delivery scenarios ----

#[tokio::test]
async fn e2e_message_for_focused_room_delivered_once() {
    let mut h = start();
    h.handle.switch_room(Room::channel("R1", "general")).unwrap();
    let mut link = h.connect_and_authenticate().await;
    h.handle
        .wait_for_state(SessionState::Authenticated, Duration::from_secs(5))
        .await
        .unwrap();

    let sub = link.expect_frame("sub").await;
    assert_eq!(sub["name"], "stream-room-messages");
    assert_eq!(sub["params"], json!(["R1", false]));
    link.deliver(json!({"msg": "ready", "subs": [sub["id"]]}));
    h.wait_subscription_ready("R1").await;

    for _ in 0..3 {
        link.deliver(changed_frame("m1", "R1", "hi"));
    }
    link.deliver(changed_frame("m2", "R1", "sentinel"));

    let first = h.next_message().await;
    assert_eq!(first.id, "m1");
    assert_eq!(first.text, "hi");
    assert_eq!(first.author_name(), "bob");
    assert_eq!(h.next_message().await.id, "m2");
}

#[tokio::test]
async fn e2e_message_for_unfocused_room_dropped() {
    let mut h = start();
    h.handle.switch_room(Room::channel("R2", "random")).unwrap();
    let mut link = h.connect_and_authenticate().await;
    h.handle.subscribe(ChannelKind::RoomMessages, "R1").unwrap();

    let mut targets = vec![
        link.expect_frame("sub").await["params"][0].clone(),
        link.expect_frame("sub").await["params"][0].clone(),
    ];
    targets.sort_by_key(|v| v.to_string());
    assert_eq!(targets, vec![json!("R1"), json!("R2")]);

    link.deliver(changed_frame("m1", "R1", "elsewhere"));
    link.deliver(changed_frame("m2", "R2", "here"));
    assert_eq!(h.next_message().await.id, "m2");
}

#[tokio::test]
async fn e2e_subscribe_twice_sends_one_frame() {
    let mut h = start();
    let mut link = h.connect_and_authenticate().await;

    h.handle.subscribe(ChannelKind::RoomMessages, "R1").unwrap();
    h.handle.subscribe(ChannelKind::RoomMessages, "R1").unwrap();
    let handle = h.handle.clone();
    let call = tokio::spawn(async move { handle.call("getServerInfo", vec![]).await });

    link.expect_frame("sub").await;
    let method = link.expect_frame("method").await;
    assert_eq!(method["method"], "getServerInfo");
    link.deliver(json!({"msg": "result", "id": method["id"], "result": {"version": "6.0.0"}}));

    let result = call.await.unwrap().unwrap();
    assert_eq!(result["version"], "6.0.0");
}

#[tokio::test]
async fn e2e_history_delivered_oldest_first_then_live() {
    let mut h = start();
    h.history
        .seed("R1", vec![message("h1", "R1"), message("h2", "R1")]);
    h.handle.switch_room(Room::direct("R1", "alice")).unwrap();
    let mut link = h.connect_and_authenticate().await;

    assert_eq!(h.next_message().await.id, "h1");
    assert_eq!(h.next_message().await.id, "h2");
    {
        let requests = h.history.requests.lock().unwrap();
        assert_eq!(requests.as_slice(), &[("R1".to_string(), RoomKind::DirectMessage, 50)]);
    }

    link.expect_frame("sub").await;
    link.deliver(changed_frame("h2", "R1", "again"));
    link.deliver(changed_frame("h3", "R1", "new"));
    assert_eq!(h.next_message().await.id, "h3");
}

#[tokio::test]
async fn e2e_history_failure_still_subscribes() {
    let mut h = start();
    h.history.fail();
    h.handle.switch_room(Room::channel("R1", "general")).unwrap();
    let mut link = h.connect_and_authenticate().await;

    let sub = link.expect_frame("sub").await;
    assert_eq!(sub["params"][0], "R1");
    link.deliver(changed_frame("m1", "R1", "live"));
    assert_eq!(h.next_message().await.id, "m1");
}

// ---- Protocol details ----

#[tokio::test]
async fn e2e_ping_answered_with_matching_pong() {
    let mut h = start();
    let mut link = h.connect_and_authenticate().await;

    link.deliver(json!({"msg": "ping", "id": "probe-1"}));
    let pong = link.expect_frame("pong").await;
    assert_eq!(pong["id"], "probe-1");

    link.deliver(json!({"msg": "ping"}));
    let pong = link.expect_frame("pong").await;
    assert!(pong.get("id").is_none());
}

#[tokio::test]
async fn e2e_call_rejected_before_authentication() {
    let h = start();
    let err = h.handle.call("getServerInfo", vec![]).await.unwrap_err();
    assert!(matches!(err, RlError::NotAuthenticated));
}

#[tokio::test]
async fn e2e_auth_rejection_surfaces() {
    let mut h = start();
    h.handle.connect(Credential::new("u1", "expired")).unwrap();
    let mut link = h.next_link().await;

    link.expect_frame("connect").await;
    link.deliver(json!({"msg": "connected"}));
    let login = link.expect_frame("method").await;
    link.deliver(json!({
        "msg": "result",
        "id": login["id"],
        "error": {"error": 403, "reason": "You've been logged out by the server.", "errorType": "Meteor.Error"}
    }));

    let status = h.wait_status(|s| s.is_terminal()).await;
    assert_eq!(
        status,
        rl_realtime::ConnectionStatus::AuthFailed("You've been logged out by the server.".into())
    );
    link.wait_closed().await;
    assert_eq!(h.handle.state(), SessionState::Disconnected);
}

// ---- Outbound ----

#[tokio::test]
async fn e2e_post_requires_focused_room() {
    let h = start();
    let err = h.handle.post_message("hello").await.unwrap_err();
    assert!(matches!(err, RlError::NoActiveRoom));
}

#[tokio::test]
async fn e2e_post_and_upload_reach_outbound_sender() {
    let h = start();
    h.handle.switch_room(Room::channel("R1", "general")).unwrap();
    h.handle.post_message("hello").await.unwrap();
    h.handle
        .upload_attachment(vec![0u8; 64], "voice.webm", "audio/webm")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.outbound.post_count() < 1 || h.outbound.upload_count() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(
        h.outbound.posts.lock().unwrap()[0],
        ("R1".to_string(), "hello".to_string())
    );
    assert_eq!(
        h.outbound.uploads.lock().unwrap()[0],
        (
            "R1".to_string(),
            "voice.webm".to_string(),
            "audio/webm".to_string(),
            64
        )
    );
}

#[tokio::test]
async fn e2e_outbound_failure_reported_not_retried() {
    let mut h = start();
    h.outbound.fail();
    h.handle.switch_room(Room::channel("R1", "general")).unwrap();
    h.handle.post_message("hello").await.unwrap();

    let (room_id, reason) = h
        .next_event(|e| match e {
            SessionEvent::SendFailed { room_id, reason } => Some((room_id, reason)),
            _ => None,
        })
        .await;
    assert_eq!(room_id, "R1");
    assert!(reason.contains("error-action-not-allowed"));
    assert_eq!(h.outbound.post_count(), 0);
}

// ---- Lifecycle ----

#[tokio::test]
async fn e2e_active_room_and_shutdown() {
    let mut h = start();
    let mut link = h.connect_and_authenticate().await;
    h.handle.switch_room(Room::channel("R7", "dev")).unwrap();

    let room = h.handle.active_room().await.unwrap().unwrap();
    assert_eq!(room.title(), "#dev");

    h.handle.shutdown();
    link.wait_closed().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.handle.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(h.handle.logout(), Err(RlError::SessionClosed)));
}
