//! Repository for the `locker_states` table.

use rackhub_core::store::StoredLockState;
use sqlx::PgPool;

use crate::models::locker_state::LockerStateRow;

/// Column list for `locker_states` queries.
const COLUMNS: &str = "\
    locker_id, state, hardware_locked, item_present, version, \
    created_at, updated_at";

/// Provides access to durable lock state.
pub struct LockerStateRepo;

impl LockerStateRepo {
    pub async fn find(pool: &PgPool, locker_id: &str) -> Result<Option<LockerStateRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM locker_states WHERE locker_id = $1");
        sqlx::query_as::<_, LockerStateRow>(&query)
            .bind(locker_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or update a locker's state unless the stored row already has
    /// the same or a newer version.
    ///
    /// Returns `true` when the row was written.
    pub async fn upsert_versioned(
        pool: &PgPool,
        locker_id: &str,
        state: &StoredLockState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO locker_states \
                 (locker_id, state, hardware_locked, item_present, version) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (locker_id) DO UPDATE SET \
                 state = EXCLUDED.state, \
                 hardware_locked = EXCLUDED.hardware_locked, \
                 item_present = EXCLUDED.item_present, \
                 version = EXCLUDED.version, \
                 updated_at = NOW() \
             WHERE locker_states.version < EXCLUDED.version",
        )
        .bind(locker_id)
        .bind(state.state.as_str())
        .bind(state.hardware_locked)
        .bind(state.item_present)
        .bind(state.version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
