//! Row model for the `unlock_grants` table.

use rackhub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `unlock_grants` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UnlockGrant {
    pub id: DbId,
    pub locker_id: String,
    pub reference: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub consumed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
