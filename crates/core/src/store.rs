//! Collaborator interfaces consumed by the controller hub.
//!
//! Durable storage of lock state and the "may this locker be opened"
//! decision both live outside the hub. The hub only talks to them through
//! these traits so it can run against Postgres in production and an
//! in-memory implementation in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::lock_state::{LockOrigin, LockState};
use crate::types::LockerId;

/// Durable view of one locker.
///
/// `version` increases by one on every accepted change. Stores must
/// ignore a write whose version is not newer than what they hold, since
/// writes are issued after the per-locker lock is released and can
/// arrive out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLockState {
    pub state: LockState,
    /// Last lock flag reported by the hardware.
    pub hardware_locked: bool,
    /// Last item-sensor reading reported by the hardware.
    pub item_present: bool,
    pub version: i64,
}

impl Default for StoredLockState {
    fn default() -> Self {
        Self {
            state: LockState::Available,
            hardware_locked: true,
            item_present: false,
            version: 0,
        }
    }
}

/// Persistence of lock state.
#[async_trait]
pub trait LockStateStore: Send + Sync {
    /// Load the last saved state, or `None` for a locker never written.
    async fn load_state(&self, locker_id: &LockerId) -> Result<Option<StoredLockState>, StoreError>;

    /// Save `state` unless a newer version is already stored.
    async fn save_state(&self, locker_id: &LockerId, state: &StoredLockState)
        -> Result<(), StoreError>;
}

/// Gate checked before a locker may enter `unlocking`.
#[async_trait]
pub trait UnlockAuthorizer: Send + Sync {
    /// Return `true` when `origin` may open `locker_id` now.
    ///
    /// Implementations backed by paid sessions consume the session they
    /// authorize, so callers should only ask once the locker is known to
    /// be available.
    async fn authorize(&self, locker_id: &LockerId, origin: LockOrigin) -> Result<bool, StoreError>;
}
