#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use rackhub_api::auth::jwt::{generate_access_token, JwtConfig};
use rackhub_api::config::ServerConfig;
use rackhub_api::router::build_app_router;
use rackhub_api::state::AppState;
use rackhub_api::ws::WsManager;
use rackhub_controllers::memory::{AllowAllAuthorizer, InMemoryLockStateStore};
use rackhub_controllers::{HubConfig, LockerHub};
use rackhub_core::store::UnlockAuthorizer;
use rackhub_events::EventBus;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and no database.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        jwt: Some(JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        }),
        hub: HubConfig {
            heartbeat_timeout: Duration::from_secs(3600),
            ..HubConfig::default()
        },
    }
}

/// Application state backed by the in-memory store and an allow-all
/// authorizer, with a freshly started hub.
pub fn test_state() -> AppState {
    test_state_with_authorizer(Arc::new(AllowAllAuthorizer))
}

/// Like [`test_state`] but with a caller-supplied unlock authorizer.
pub fn test_state_with_authorizer(authorizer: Arc<dyn UnlockAuthorizer>) -> AppState {
    let config = test_config();
    let event_bus = Arc::new(EventBus::default());
    let hub = LockerHub::start(
        config.hub.clone(),
        Arc::clone(&event_bus),
        Arc::new(InMemoryLockStateStore::new()),
        authorizer,
    );

    AppState {
        pool: None,
        config: Arc::new(config),
        ws_manager: Arc::new(WsManager::new()),
        hub,
        event_bus,
    }
}

/// Sign an access token with the test secret.
pub fn token_for(subject: &str, role: &str) -> String {
    let config = test_config();
    generate_access_token(subject, role, config.jwt.as_ref().unwrap()).unwrap()
}

/// Build the full application router with all middleware layers.
///
/// Uses the same builder as `main.rs` so integration tests exercise the
/// production middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery).
pub fn build_test_app(state: AppState) -> Router {
    let config = state.config.clone();
    build_app_router(state, &config)
}

/// Issue a GET request against the router.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Issue a POST request with an empty body and an optional Bearer token.
pub async fn post(app: Router, uri: &str, token: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    app.oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a JSON error envelope with the given status and code.
pub async fn assert_error(response: axum::response::Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code);
    assert!(json["error"].is_string());
}
