use std::net::SocketAddr;
use std::sync::Arc;

use rackhub_controllers::memory::{AllowAllAuthorizer, InMemoryLockStateStore};
use rackhub_controllers::LockerHub;
use rackhub_core::store::{LockStateStore, UnlockAuthorizer};
use rackhub_db::store::{PgLockStateStore, PgUnlockAuthorizer};
use rackhub_events::EventBus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rackhub_api::config::ServerConfig;
use rackhub_api::router::build_app_router;
use rackhub_api::state::AppState;
use rackhub_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "rackhub_api=debug,rackhub_controllers=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    if config.jwt.is_none() {
        tracing::warn!("JWT_SECRET not set, administrative observers will be refused");
    }

    // --- Persistence collaborators ---
    let (pool, store, authorizer): (
        Option<rackhub_db::DbPool>,
        Arc<dyn LockStateStore>,
        Arc<dyn UnlockAuthorizer>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = rackhub_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            rackhub_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            rackhub_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Some(pool.clone()),
                Arc::new(PgLockStateStore::new(pool.clone())),
                Arc::new(PgUnlockAuthorizer::new(pool)),
            )
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory lock state and allowing every unlock"
            );
            (
                None,
                Arc::new(InMemoryLockStateStore::new()),
                Arc::new(AllowAllAuthorizer),
            )
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // --- Locker hub ---
    let hub = LockerHub::start(config.hub.clone(), Arc::clone(&event_bus), store, authorizer);

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        hub: Arc::clone(&hub),
        event_bus,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Controller and observer sockets are long-lived, so they are closed as
    // soon as the signal arrives rather than after the server drains.
    let shutdown = {
        let hub = Arc::clone(&hub);
        let ws_manager = Arc::clone(&ws_manager);
        async move {
            shutdown_signal().await;
            // Cancels armed auto-locks and every controller link.
            hub.shutdown().await;
            let ws_count = ws_manager.connection_count().await;
            tracing::info!(ws_count, "Closing remaining WebSocket connections");
            ws_manager.shutdown_all().await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
