//! Locker endpoints: read-only snapshots plus authenticated lock and
//! unlock commands.

use axum::extract::{Path, State};
use axum::Json;
use rackhub_controllers::{ControllerSnapshot, Delivery, LockerSnapshot};
use rackhub_core::types::LockerId;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/controllers
pub async fn list_controllers(
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<ControllerSnapshot>>> {
    Json(DataResponse {
        data: state.hub.controllers().await,
    })
}

/// GET /api/v1/lockers/{rack_id}
///
/// Returns 404 for a locker that has no stored state and no controller
/// serving it.
pub async fn get_locker(
    State(state): State<AppState>,
    Path(rack_id): Path<String>,
) -> AppResult<Json<DataResponse<LockerSnapshot>>> {
    let snapshot = state.hub.locker(&parse_rack_id(rack_id)?).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/v1/lockers/{rack_id}/unlock
///
/// Customers need an open unlock grant for the locker, which this call
/// consumes. Admin tokens bypass the grant check.
pub async fn unlock_locker(
    user: AuthUser,
    State(state): State<AppState>,
    Path(rack_id): Path<String>,
) -> AppResult<Json<DataResponse<Delivery>>> {
    let locker_id = parse_rack_id(rack_id)?;
    tracing::info!(locker_id = %locker_id, subject = %user.subject, "Unlock requested");
    let delivery = state.hub.unlock(&locker_id, user.lock_origin()).await?;
    Ok(Json(DataResponse { data: delivery }))
}

/// POST /api/v1/lockers/{rack_id}/lock
pub async fn lock_locker(
    user: AuthUser,
    State(state): State<AppState>,
    Path(rack_id): Path<String>,
) -> AppResult<Json<DataResponse<Delivery>>> {
    let locker_id = parse_rack_id(rack_id)?;
    tracing::info!(locker_id = %locker_id, subject = %user.subject, "Lock requested");
    let delivery = state.hub.lock(&locker_id, user.lock_origin()).await?;
    Ok(Json(DataResponse { data: delivery }))
}

fn parse_rack_id(rack_id: String) -> Result<LockerId, AppError> {
    if rack_id.trim().is_empty() {
        return Err(AppError::BadRequest("rack_id must not be empty".into()));
    }
    Ok(LockerId::from(rack_id))
}
