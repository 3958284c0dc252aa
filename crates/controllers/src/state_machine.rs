//! Lock State Machine: per-locker state with serialized access.
//!
//! Each locker has its own async mutex. Holding a [`LockerGuard`] is the
//! only way to read-modify-write a locker's state, and notifications for a
//! locker are published while its guard is held, so observers see them in
//! transition order. Store calls never happen under a guard: callers take
//! a [`StoredLockState`] snapshot, drop the guard, then [`persist`].
//!
//! [`persist`]: LockStateMachine::persist

use std::collections::HashMap;
use std::sync::Arc;

use rackhub_core::error::StoreError;
use rackhub_core::lock_state::{LockOrigin, LockState, LockTrigger, TransitionError};
use rackhub_core::store::{LockStateStore, StoredLockState};
use rackhub_core::types::LockerId;
use rackhub_events::{EventBus, LockStatus, LockerEvent};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{HubError, HubResult};

pub struct LockStateMachine {
    records: Mutex<HashMap<LockerId, Arc<Mutex<StoredLockState>>>>,
    store: Arc<dyn LockStateStore>,
    bus: Arc<EventBus>,
}

impl LockStateMachine {
    pub fn new(store: Arc<dyn LockStateStore>, bus: Arc<EventBus>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            store,
            bus,
        }
    }

    /// Acquire exclusive access to `locker_id`, loading it from the store
    /// on first use. A locker the store has never seen starts `available`.
    pub async fn lock(&self, locker_id: &LockerId) -> HubResult<LockerGuard> {
        let record = self.record(locker_id).await?;
        Ok(LockerGuard {
            locker_id: locker_id.clone(),
            record: record.lock_owned().await,
            bus: self.bus.clone(),
        })
    }

    /// Current state without holding the guard afterwards.
    pub async fn peek(&self, locker_id: &LockerId) -> HubResult<LockState> {
        Ok(self.lock(locker_id).await?.state())
    }

    /// Stored view of a locker, or `None` when neither memory nor the
    /// store has ever seen it.
    pub async fn find(&self, locker_id: &LockerId) -> HubResult<Option<StoredLockState>> {
        let cached = self.records.lock().await.get(locker_id).cloned();
        match cached {
            Some(record) => Ok(Some(record.lock().await.clone())),
            None => Ok(self.store.load_state(locker_id).await?),
        }
    }

    /// Write a snapshot through to the store. Failures are logged, not
    /// returned: the in-memory state stays authoritative.
    pub async fn persist(&self, locker_id: &LockerId, snapshot: StoredLockState) {
        if let Err(e) = self.store.save_state(locker_id, &snapshot).await {
            tracing::error!(
                locker_id = %locker_id,
                version = snapshot.version,
                error = %e,
                "Failed to persist lock state",
            );
        }
    }

    async fn record(&self, locker_id: &LockerId) -> Result<Arc<Mutex<StoredLockState>>, StoreError> {
        if let Some(record) = self.records.lock().await.get(locker_id) {
            return Ok(record.clone());
        }

        let loaded = self.store.load_state(locker_id).await?.unwrap_or_default();

        // Another task may have loaded the same locker while we were in
        // the store. Keep whichever record got there first.
        let mut records = self.records.lock().await;
        let record = records
            .entry(locker_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(record.clone())
    }
}

/// Exclusive access to one locker's state.
pub struct LockerGuard {
    locker_id: LockerId,
    record: OwnedMutexGuard<StoredLockState>,
    bus: Arc<EventBus>,
}

impl LockerGuard {
    pub fn locker_id(&self) -> &LockerId {
        &self.locker_id
    }

    pub fn state(&self) -> LockState {
        self.record.state
    }

    pub fn snapshot(&self) -> StoredLockState {
        self.record.clone()
    }

    /// Apply `trigger` and publish the change.
    ///
    /// On success the version is bumped and `led-status` (locker),
    /// `rack-status` (admin) and, when the door opens or closes,
    /// `lock-status` (locker) are published.
    pub fn transition(&mut self, trigger: LockTrigger, origin: Option<LockOrigin>) -> HubResult<LockState> {
        let from = self.record.state;
        let to = from.apply(trigger).map_err(|e| self.rejected(e))?;

        self.record.state = to;
        self.record.version += 1;

        tracing::info!(
            locker_id = %self.locker_id,
            from = %from,
            to = %to,
            trigger = ?trigger,
            origin = ?origin,
            "Lock state changed",
        );

        self.bus.publish_locker(
            &self.locker_id,
            LockerEvent::LedStatus {
                locker_id: self.locker_id.clone(),
                color: to.led_color(),
            },
        );
        let door = match (from, to) {
            (_, LockState::Occupied) => Some(LockStatus::Unlocked),
            (LockState::Occupied, LockState::Available) => Some(LockStatus::Locked),
            _ => None,
        };
        if let Some(status) = door {
            self.bus.publish_locker(
                &self.locker_id,
                LockerEvent::LockStatus {
                    locker_id: self.locker_id.clone(),
                    status,
                    origin,
                },
            );
        }
        self.bus.publish_admin(LockerEvent::RackStatus {
            locker_id: self.locker_id.clone(),
            from,
            to,
            origin,
        });

        Ok(to)
    }

    /// Record hardware flags reported by the controller.
    ///
    /// Returns `true` when either flag changed.
    pub fn set_hardware(&mut self, locked: bool, item_present: bool) -> bool {
        let changed = self.record.hardware_locked != locked || self.record.item_present != item_present;
        if changed {
            self.record.hardware_locked = locked;
            self.record.item_present = item_present;
            self.record.version += 1;
        }
        changed
    }

    fn rejected(&self, error: TransitionError) -> HubError {
        match error {
            TransitionError::NotAvailable(state) => HubError::NotAvailable {
                locker_id: self.locker_id.clone(),
                state,
            },
            TransitionError::Invalid { from, trigger } => HubError::InvalidState {
                locker_id: self.locker_id.clone(),
                action: trigger_action(trigger),
                state: from,
            },
        }
    }
}

fn trigger_action(trigger: LockTrigger) -> &'static str {
    match trigger {
        LockTrigger::UnlockRequested => "unlock",
        LockTrigger::UnlockDelivered => "complete an unlock",
        LockTrigger::UnlockFailed => "fail an unlock",
        LockTrigger::LockCompleted => "lock",
        LockTrigger::HardwareFault => "fault",
        LockTrigger::AdminReset => "reset",
    }
}
