//! Postgres implementations of the hub's collaborator traits.

use async_trait::async_trait;
use rackhub_core::error::StoreError;
use rackhub_core::lock_state::LockOrigin;
use rackhub_core::store::{LockStateStore, StoredLockState, UnlockAuthorizer};
use rackhub_core::types::LockerId;

use crate::repositories::{LockerStateRepo, UnlockGrantRepo};
use crate::DbPool;

fn store_error(e: sqlx::Error) -> StoreError {
    StoreError::new(e.to_string())
}

/// [`LockStateStore`] backed by the `locker_states` table.
#[derive(Clone)]
pub struct PgLockStateStore {
    pool: DbPool,
}

impl PgLockStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStateStore for PgLockStateStore {
    async fn load_state(&self, locker_id: &LockerId) -> Result<Option<StoredLockState>, StoreError> {
        let row = LockerStateRepo::find(&self.pool, locker_id.as_str())
            .await
            .map_err(store_error)?;
        row.map(|r| r.into_stored().map_err(StoreError::new))
            .transpose()
    }

    async fn save_state(&self, locker_id: &LockerId, state: &StoredLockState) -> Result<(), StoreError> {
        let written = LockerStateRepo::upsert_versioned(&self.pool, locker_id.as_str(), state)
            .await
            .map_err(store_error)?;
        if !written {
            tracing::debug!(
                locker_id = %locker_id,
                version = state.version,
                "Skipped stale lock state write",
            );
        }
        Ok(())
    }
}

/// [`UnlockAuthorizer`] that consumes one open grant per user unlock.
/// Administrative unlocks need no grant.
#[derive(Clone)]
pub struct PgUnlockAuthorizer {
    pool: DbPool,
}

impl PgUnlockAuthorizer {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnlockAuthorizer for PgUnlockAuthorizer {
    async fn authorize(&self, locker_id: &LockerId, origin: LockOrigin) -> Result<bool, StoreError> {
        if origin == LockOrigin::Admin {
            return Ok(true);
        }
        let grant = UnlockGrantRepo::claim(&self.pool, locker_id.as_str())
            .await
            .map_err(store_error)?;
        if let Some(grant) = &grant {
            tracing::info!(locker_id = %locker_id, grant_id = grant.id, "Consumed unlock grant");
        }
        Ok(grant.is_some())
    }
}
