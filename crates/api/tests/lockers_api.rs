//! Integration tests for the read-only controller and locker endpoints.
//!
//! Controllers are attached through [`rackhub_controllers::ControllerLink`]
//! directly, the same adapter the WebSocket endpoint drives.

mod common;

use axum::http::StatusCode;
use common::{assert_error, body_json, get};
use rackhub_controllers::{ControllerLink, OutboundMessage};
use rackhub_core::lock_state::LockOrigin;
use rackhub_core::types::LockerId;
use serde_json::json;
use tokio::sync::mpsc;

async fn attach(
    state: &rackhub_api::state::AppState,
    frame: serde_json::Value,
) -> (ControllerLink, mpsc::Receiver<OutboundMessage>) {
    let (mut link, mut rx) = state.hub.open_link();
    link.on_text(&frame.to_string()).await.unwrap();
    assert!(matches!(
        rx.recv().await,
        Some(OutboundMessage::Registered { .. })
    ));
    (link, rx)
}

fn shelf_frame() -> serde_json::Value {
    json!({
        "type": "shelf_register",
        "shelf_id": "SHELF-1",
        "ip": "10.0.0.7",
        "racks": [
            { "rack_id": "L1", "is_locked": true, "item_present": true },
            { "rack_id": "L2", "is_locked": true, "item_present": false },
        ],
    })
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/controllers lists live sessions with their doors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_controllers_shows_registered_shelf() {
    let state = common::test_state();
    let (_link, _rx) = attach(&state, shelf_frame()).await;

    let response = get(common::build_test_app(state), "/api/v1/controllers").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let controllers = json["data"].as_array().unwrap();
    assert_eq!(controllers.len(), 1);
    assert_eq!(controllers[0]["controller_id"], "SHELF-1");
    assert_eq!(controllers[0]["kind"], "multi");
    assert_eq!(controllers[0]["ip"], "10.0.0.7");
    assert_eq!(controllers[0]["doors"][1]["locker_id"], "L2");
    assert_eq!(controllers[0]["doors"][1]["door_index"], 1);
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/controllers is empty with no controllers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_controllers_empty() {
    let response = get(
        common::build_test_app(common::test_state()),
        "/api/v1/controllers",
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"], json!([]));
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/lockers/{rack_id} reports routing and state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_locker_reports_route_and_state() {
    let state = common::test_state();
    let (_link, _rx) = attach(&state, shelf_frame()).await;

    let response = get(common::build_test_app(state), "/api/v1/lockers/L2").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["locker_id"], "L2");
    assert_eq!(data["state"], "available");
    assert_eq!(data["led"], "green");
    assert_eq!(data["reachable"], true);
    assert_eq!(data["controller_id"], "SHELF-1");
    assert_eq!(data["door_index"], 1);
    assert_eq!(data["item_present"], false);
    assert!(data["auto_lock_remaining_ms"].is_null());
}

// ---------------------------------------------------------------------------
// Test: an unlocked locker shows occupied with an armed auto-lock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_locker_after_unlock_shows_auto_lock() {
    let state = common::test_state();
    let (_link, mut rx) = attach(&state, shelf_frame()).await;

    state
        .hub
        .unlock(&LockerId::from("L1"), LockOrigin::Admin)
        .await
        .unwrap();
    assert_eq!(
        rx.recv().await,
        Some(OutboundMessage::Unlock {
            rack_id: LockerId::from("L1"),
            door_index: Some(0),
        })
    );

    let json = body_json(get(common::build_test_app(state), "/api/v1/lockers/L1").await).await;
    assert_eq!(json["data"]["state"], "occupied");
    assert_eq!(json["data"]["led"], "red");
    let remaining = json["data"]["auto_lock_remaining_ms"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 30_000);
}

// ---------------------------------------------------------------------------
// Test: a disconnected locker keeps its state but becomes unreachable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_locker_after_disconnect_is_unreachable() {
    let state = common::test_state();
    let (link, rx) = attach(&state, shelf_frame()).await;
    link.close(rx).await;

    let json = body_json(get(common::build_test_app(state), "/api/v1/lockers/L1").await).await;
    assert_eq!(json["data"]["state"], "available");
    assert_eq!(json["data"]["reachable"], false);
    assert!(json["data"]["controller_id"].is_null());
}

// ---------------------------------------------------------------------------
// Test: an unknown locker returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_locker_returns_404() {
    let response = get(
        common::build_test_app(common::test_state()),
        "/api/v1/lockers/NOPE",
    )
    .await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}
