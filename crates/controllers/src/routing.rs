//! Routing Table: which controller session currently serves each locker.
//!
//! Entries are ephemeral. A missing entry means the locker is unreachable
//! right now, not that it does not exist.

use std::collections::HashMap;

use rackhub_core::types::{ControllerId, DoorIndex, LockerId};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identifies one live session of a controller.
///
/// `session_id` distinguishes a reconnect of the same controller from the
/// session it replaced, so cleanup of a stale session never touches
/// entries a newer session installed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub controller_id: ControllerId,
    pub session_id: Uuid,
}

impl SessionHandle {
    pub fn new(controller_id: ControllerId) -> Self {
        Self {
            controller_id,
            session_id: Uuid::now_v7(),
        }
    }
}

/// Binding of a locker to the session responsible for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub session: SessionHandle,
    /// Door position on a multi-door controller.
    pub door_index: Option<DoorIndex>,
}

#[derive(Default)]
pub struct RoutingTable {
    entries: RwLock<HashMap<LockerId, RoutingEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite the entry for `locker_id`. Last writer wins.
    ///
    /// Returns the entry that was replaced, if any.
    pub async fn bind(
        &self,
        locker_id: LockerId,
        session: SessionHandle,
        door_index: Option<DoorIndex>,
    ) -> Option<RoutingEntry> {
        self.entries.write().await.insert(
            locker_id,
            RoutingEntry {
                session,
                door_index,
            },
        )
    }

    pub async fn resolve(&self, locker_id: &LockerId) -> Option<RoutingEntry> {
        self.entries.read().await.get(locker_id).cloned()
    }

    /// Remove the entries for `locker_ids` that still point at `session`.
    ///
    /// Entries already rebound to another session are left alone. Returns
    /// the identifiers that were actually removed.
    pub async fn unbind_all(&self, locker_ids: &[LockerId], session: &SessionHandle) -> Vec<LockerId> {
        let mut entries = self.entries.write().await;
        let mut removed = Vec::new();
        for locker_id in locker_ids {
            let owned = entries
                .get(locker_id)
                .is_some_and(|entry| &entry.session == session);
            if owned {
                entries.remove(locker_id);
                removed.push(locker_id.clone());
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
