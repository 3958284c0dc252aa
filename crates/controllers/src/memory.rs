//! In-memory collaborators for development mode and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use rackhub_core::error::StoreError;
use rackhub_core::lock_state::LockOrigin;
use rackhub_core::store::{LockStateStore, StoredLockState, UnlockAuthorizer};
use rackhub_core::types::LockerId;
use tokio::sync::Mutex;

/// [`LockStateStore`] backed by a map. Honours version ordering like the
/// Postgres store does.
#[derive(Default)]
pub struct InMemoryLockStateStore {
    states: Mutex<HashMap<LockerId, StoredLockState>>,
}

impl InMemoryLockStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStateStore for InMemoryLockStateStore {
    async fn load_state(&self, locker_id: &LockerId) -> Result<Option<StoredLockState>, StoreError> {
        Ok(self.states.lock().await.get(locker_id).cloned())
    }

    async fn save_state(&self, locker_id: &LockerId, state: &StoredLockState) -> Result<(), StoreError> {
        let mut states = self.states.lock().await;
        let newer = states
            .get(locker_id)
            .map_or(true, |current| current.version < state.version);
        if newer {
            states.insert(locker_id.clone(), state.clone());
        }
        Ok(())
    }
}

/// Authorizes every unlock.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl UnlockAuthorizer for AllowAllAuthorizer {
    async fn authorize(&self, _locker_id: &LockerId, _origin: LockOrigin) -> Result<bool, StoreError> {
        Ok(true)
    }
}

/// Counts unconsumed unlock grants per locker. Each user unlock consumes
/// one grant; administrative unlocks need none.
#[derive(Default)]
pub struct InMemoryGrants {
    grants: Mutex<HashMap<LockerId, u32>>,
}

impl InMemoryGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, locker_id: LockerId) {
        *self.grants.lock().await.entry(locker_id).or_default() += 1;
    }

    pub async fn remaining(&self, locker_id: &LockerId) -> u32 {
        self.grants.lock().await.get(locker_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl UnlockAuthorizer for InMemoryGrants {
    async fn authorize(&self, locker_id: &LockerId, origin: LockOrigin) -> Result<bool, StoreError> {
        if origin == LockOrigin::Admin {
            return Ok(true);
        }
        let mut grants = self.grants.lock().await;
        match grants.get_mut(locker_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
