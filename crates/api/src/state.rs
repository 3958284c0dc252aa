use std::sync::Arc;

use rackhub_controllers::LockerHub;
use rackhub_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool. `None` when running on in-memory collaborators.
    pub pool: Option<rackhub_db::DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Observer and controller WebSocket connections.
    pub ws_manager: Arc<WsManager>,
    /// The controller hub owning registry, routing and lock state.
    pub hub: Arc<LockerHub>,
    /// Notification fan-out shared with the hub.
    pub event_bus: Arc<EventBus>,
}
