//! Repository for the `unlock_grants` table.

use rackhub_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::unlock_grant::UnlockGrant;

/// Column list for `unlock_grants` queries.
const COLUMNS: &str = "id, locker_id, reference, expires_at, consumed_at, created_at";

/// Provides access to unlock grants.
pub struct UnlockGrantRepo;

impl UnlockGrantRepo {
    /// Issue a grant. Normally called by the payment collaborator.
    pub async fn create(
        pool: &PgPool,
        locker_id: &str,
        reference: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<UnlockGrant, sqlx::Error> {
        let query = format!(
            "INSERT INTO unlock_grants (locker_id, reference, expires_at) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UnlockGrant>(&query)
            .bind(locker_id)
            .bind(reference)
            .bind(expires_at)
            .fetch_one(pool)
            .await
    }

    /// Atomically consume the oldest open grant for a locker.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so two concurrent unlocks can
    /// never consume the same grant.
    pub async fn claim(pool: &PgPool, locker_id: &str) -> Result<Option<UnlockGrant>, sqlx::Error> {
        let query = format!(
            "UPDATE unlock_grants \
             SET consumed_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM unlock_grants \
                 WHERE locker_id = $1 \
                   AND consumed_at IS NULL \
                   AND (expires_at IS NULL OR expires_at > NOW()) \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UnlockGrant>(&query)
            .bind(locker_id)
            .fetch_optional(pool)
            .await
    }
}
