//! Row model for the `locker_states` table.

use rackhub_core::lock_state::LockState;
use rackhub_core::store::StoredLockState;
use rackhub_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `locker_states` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LockerStateRow {
    pub locker_id: String,
    pub state: String,
    pub hardware_locked: bool,
    pub item_present: bool,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LockerStateRow {
    /// Convert to the domain view. Fails on a `state` value the schema
    /// check should have prevented.
    pub fn into_stored(self) -> Result<StoredLockState, String> {
        Ok(StoredLockState {
            state: self.state.parse::<LockState>()?,
            hardware_locked: self.hardware_locked,
            item_present: self.item_present,
            version: self.version,
        })
    }
}
