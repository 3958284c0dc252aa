use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rackhub_controllers::{HubError, UnreachableReason};
use rackhub_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`HubError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `rackhub_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error raised by the locker hub.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// HTTP status, machine-readable code and client-facing message.
    ///
    /// Internal details are logged here and replaced by a generic message.
    pub fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- HubError variants ---
            AppError::Hub(hub) => classify_hub_error(hub),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a hub error into an HTTP status, error code, and message.
///
/// - Unreachable lockers map to 503 (`504` when the transport timed out).
/// - State-machine rejections map to 409.
/// - Store failures map to 500 with a sanitized message.
fn classify_hub_error(err: &HubError) -> (StatusCode, &'static str, String) {
    match err {
        HubError::DeviceUnreachable {
            reason: UnreachableReason::Timeout(_),
            ..
        } => (
            StatusCode::GATEWAY_TIMEOUT,
            "DEVICE_TIMEOUT",
            err.to_string(),
        ),
        HubError::DeviceUnreachable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "DEVICE_UNREACHABLE",
            err.to_string(),
        ),
        HubError::NotAvailable { .. } => (StatusCode::CONFLICT, "NOT_AVAILABLE", err.to_string()),
        HubError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE", err.to_string()),
        HubError::NotAuthorized(_) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED", err.to_string()),
        HubError::UnknownLocker(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        HubError::Malformed(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        HubError::DuplicateRegistration(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        HubError::AutoLockFailed { .. } | HubError::Store(_) => {
            tracing::error!(error = %err, "Hub error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
