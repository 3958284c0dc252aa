use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::ConnectionRole;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Which lock-state store backs the hub (`postgres` or `memory`).
    pub storage: &'static str,
    /// Whether the database is reachable. Always `true` in memory mode.
    pub db_healthy: bool,
    /// Live controller sessions.
    pub controllers: usize,
    /// Connected observer sockets.
    pub observers: usize,
}

/// GET /health -- returns service, database and hub health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (storage, db_healthy) = match &state.pool {
        Some(pool) => ("postgres", rackhub_db::health_check(pool).await.is_ok()),
        None => ("memory", true),
    };

    let status = if state.hub.is_shutting_down() {
        "shutting_down"
    } else if db_healthy {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        storage,
        db_healthy,
        controllers: state.hub.controller_count().await,
        observers: state.ws_manager.count_by_role(ConnectionRole::Observer).await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
