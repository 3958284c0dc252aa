use std::time::Duration;

use rackhub_controllers::HubConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Postgres URL. `None` runs the hub on in-memory collaborators.
    pub database_url: Option<String>,
    /// Observer token validation. `None` refuses administrative access.
    pub jwt: Option<JwtConfig>,
    /// Controller hub tunables.
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `DATABASE_URL`            | unset (in-memory)       |
    /// | `JWT_SECRET`              | unset (no admin access) |
    /// | `AUTO_LOCK_DURATION_SECS` | `30`                    |
    /// | `COMMAND_TIMEOUT_MS`      | `5000`                  |
    /// | `HEARTBEAT_TIMEOUT_SECS`  | `60`                    |
    /// | `SWEEP_INTERVAL_SECS`     | `25`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let jwt = JwtConfig::from_env();

        let defaults = HubConfig::default();
        let hub = HubConfig {
            auto_lock_duration: Duration::from_secs(env_u64(
                "AUTO_LOCK_DURATION_SECS",
                defaults.auto_lock_duration.as_secs(),
            )),
            command_timeout: Duration::from_millis(env_u64(
                "COMMAND_TIMEOUT_MS",
                defaults.command_timeout.as_millis() as u64,
            )),
            heartbeat_timeout: Duration::from_secs(env_u64(
                "HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_u64(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            ..defaults
        };
        assert!(
            !hub.sweep_interval.is_zero(),
            "SWEEP_INTERVAL_SECS must be greater than zero"
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            jwt,
            hub,
        }
    }
}

/// Read a `u64` env var, falling back to `default` when unset.
///
/// # Panics
///
/// Panics if the variable is set but not a valid `u64`.
fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
