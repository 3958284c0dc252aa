pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/controller              controller WebSocket (registration, heartbeats, status)
/// /ws/observer                observer WebSocket (?token= for administrative access)
///
/// /controllers                live controller sessions
/// /lockers/{rack_id}          one locker: state, reachability, auto-lock
/// /lockers/{rack_id}/unlock   POST, Bearer token (customers need an unlock grant)
/// /lockers/{rack_id}/lock     POST, Bearer token
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/controller", get(ws::controller_ws_handler))
        .route("/ws/observer", get(ws::observer_ws_handler))
        .route("/controllers", get(handlers::lockers::list_controllers))
        .route("/lockers/{rack_id}", get(handlers::lockers::get_locker))
        .route("/lockers/{rack_id}/unlock", post(handlers::lockers::unlock_locker))
        .route("/lockers/{rack_id}/lock", post(handlers::lockers::lock_locker))
}
