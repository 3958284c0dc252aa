//! End-to-end tests for the controller and observer WebSocket endpoints.
//!
//! Each test serves the real router on an ephemeral port and connects with
//! `tokio-tungstenite`, the same client library the simulator uses.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use rackhub_api::auth::jwt::{generate_access_token, JwtConfig};
use rackhub_api::state::AppState;
use rackhub_core::lock_state::LockOrigin;
use rackhub_core::types::LockerId;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(state: AppState) -> SocketAddr {
    let app = common::build_test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    socket
}

fn admin_token() -> String {
    let config = JwtConfig {
        secret: common::TEST_JWT_SECRET.to_string(),
        access_token_expiry_mins: 15,
    };
    generate_access_token("ops-1", "admin", &config).unwrap()
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next JSON text frame, skipping pings.
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one satisfies `pred`.
async fn next_matching(socket: &mut Socket, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let value = next_json(socket).await;
        if pred(&value) {
            return value;
        }
    }
}

async fn wait_for_controllers(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.hub.controller_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("controller count never reached {expected}");
}

fn shelf_register() -> Value {
    json!({
        "type": "shelf_register",
        "shelf_id": "SHELF-1",
        "racks": [
            { "rack_id": "L1", "is_locked": true, "item_present": true },
            { "rack_id": "L2", "is_locked": true, "item_present": true },
        ],
    })
}

// ---------------------------------------------------------------------------
// Test: a controller registers, is acknowledged, and is released on close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn controller_registers_and_disconnects() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;

    let mut controller = connect(addr, "/api/v1/ws/controller").await;
    send(
        &mut controller,
        json!({ "type": "register", "controller_id": "L7", "is_locked": true, "item_present": false }),
    )
    .await;

    let ack = next_json(&mut controller).await;
    assert_eq!(ack["type"], "registered");
    assert_eq!(ack["controller_id"], "L7");
    assert_eq!(ack["lockers"], json!(["L7"]));
    assert_eq!(state.hub.controller_count().await, 1);

    controller.close(None).await.unwrap();
    wait_for_controllers(&state, 0).await;
    assert!(state.hub.resolve(&LockerId::from("L7")).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: malformed controller frames leave the connection up
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_controller_frame_keeps_connection() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;

    let mut controller = connect(addr, "/api/v1/ws/controller").await;
    send(&mut controller, json!({ "type": "teleport" })).await;
    send(&mut controller, shelf_register()).await;

    let ack = next_json(&mut controller).await;
    assert_eq!(ack["type"], "registered");
    assert_eq!(ack["lockers"], json!(["L1", "L2"]));
}

// ---------------------------------------------------------------------------
// Test: an admin observer unlocks a shelf door end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_observer_unlocks_through_controller() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;

    let mut controller = connect(addr, "/api/v1/ws/controller").await;
    send(&mut controller, shelf_register()).await;
    assert_eq!(next_json(&mut controller).await["type"], "registered");

    let mut observer = connect(addr, &format!("/api/v1/ws/observer?token={}", admin_token())).await;
    send(&mut observer, json!({ "type": "subscribe_admin" })).await;
    assert_eq!(next_json(&mut observer).await["type"], "admin_subscribed");

    send(&mut observer, json!({ "type": "unlock", "rack_id": "L2" })).await;

    let command = next_json(&mut controller).await;
    assert_eq!(command, json!({ "type": "unlock", "rack_id": "L2", "door_index": 1 }));

    let sent = next_matching(&mut observer, |v| v["type"] == "command_sent").await;
    assert_eq!(sent["command"], "unlock");
    assert_eq!(sent["controller_id"], "SHELF-1");
    assert_eq!(sent["door_index"], 1);

    let state_change = state.hub.state(&LockerId::from("L2")).await.unwrap();
    assert_eq!(state_change.as_str(), "occupied");
}

// ---------------------------------------------------------------------------
// Test: admin observers see rack-status notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_observer_receives_rack_status() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;
    let (mut link, mut rx) = state.hub.open_link();
    link.on_text(&shelf_register().to_string()).await.unwrap();
    rx.recv().await.unwrap();

    let mut observer = connect(addr, &format!("/api/v1/ws/observer?token={}", admin_token())).await;
    send(&mut observer, json!({ "type": "subscribe_admin" })).await;
    assert_eq!(next_json(&mut observer).await["type"], "admin_subscribed");

    state
        .hub
        .unlock(&LockerId::from("L1"), LockOrigin::User)
        .await
        .unwrap();

    let rack = next_matching(&mut observer, |v| v["event"] == "rack-status").await;
    assert_eq!(rack["locker_id"], "L1");
    assert_eq!(rack["from"], "available");
    assert_eq!(rack["to"], "unlocking");
}

// ---------------------------------------------------------------------------
// Test: anonymous observers get per-locker events but no admin access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_observer_is_scoped_to_its_lockers() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;
    let (mut link, mut rx) = state.hub.open_link();
    link.on_text(&shelf_register().to_string()).await.unwrap();
    rx.recv().await.unwrap();

    let mut observer = connect(addr, "/api/v1/ws/observer").await;

    send(&mut observer, json!({ "type": "subscribe_admin" })).await;
    assert_eq!(next_json(&mut observer).await["type"], "error");

    send(&mut observer, json!({ "type": "unlock", "rack_id": "L1" })).await;
    assert_eq!(next_json(&mut observer).await["type"], "error");

    send(&mut observer, json!({ "type": "subscribe_rack", "rack_id": "L1" })).await;
    assert_eq!(next_json(&mut observer).await["type"], "subscribed");

    state
        .hub
        .unlock(&LockerId::from("L2"), LockOrigin::User)
        .await
        .unwrap();
    state
        .hub
        .unlock(&LockerId::from("L1"), LockOrigin::User)
        .await
        .unwrap();

    // Only L1 notifications arrive, and never an administrative one.
    let first = next_json(&mut observer).await;
    assert_eq!(first["event"], "led-status");
    assert_eq!(first["locker_id"], "L1");
    assert_eq!(first["color"], "blue");

    send(&mut observer, json!({ "type": "ping" })).await;
    let pong = next_matching(&mut observer, |v| {
        assert_ne!(v["locker_id"], "L2");
        assert_ne!(v["event"], "rack-status");
        v["type"] == "pong"
    })
    .await;
    assert_eq!(pong["type"], "pong");
}

// ---------------------------------------------------------------------------
// Test: an invalid token is refused before the upgrade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_token_is_refused() {
    let state = common::test_state();
    let addr = serve(state).await;

    let result = connect_async(format!("ws://{addr}/api/v1/ws/observer?token=not-a-jwt")).await;
    assert_matches!(
        result,
        Err(tokio_tungstenite::tungstenite::Error::Http(response))
            if response.status() == 401
    );
}

// ---------------------------------------------------------------------------
// Test: a reconnecting controller supersedes and closes the old socket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_closes_superseded_socket() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;

    let mut first = connect(addr, "/api/v1/ws/controller").await;
    send(&mut first, shelf_register()).await;
    assert_eq!(next_json(&mut first).await["type"], "registered");

    let mut second = connect(addr, "/api/v1/ws/controller").await;
    send(&mut second, shelf_register()).await;
    assert_eq!(next_json(&mut second).await["type"], "registered");

    // The first socket receives a Close frame (or simply ends).
    let ended = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "superseded socket was not closed");

    wait_for_controllers(&state, 1).await;
    assert_eq!(
        state
            .hub
            .resolve(&LockerId::from("L1"))
            .await
            .unwrap()
            .session
            .controller_id
            .as_str(),
        "SHELF-1"
    );
}
