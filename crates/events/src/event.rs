//! Notification payloads fanned out to observers.

use rackhub_core::event_names::{
    EVENT_AUTO_LOCK_FAILED, EVENT_CONNECTIVITY_CHANGED, EVENT_ITEM_STATUS, EVENT_LED_STATUS,
    EVENT_LOCK_STATUS, EVENT_RACK_STATUS, EVENT_REFILL_NEEDED,
};
use rackhub_core::lock_state::{LedColor, LockOrigin, LockState};
use rackhub_core::types::{ControllerId, LockerId};
use serde::{Deserialize, Serialize};

/// Physical lock flag as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Locked,
    Unlocked,
}

impl LockStatus {
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            LockStatus::Locked
        } else {
            LockStatus::Unlocked
        }
    }
}

/// Kind of physical controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// One controller per door.
    Single,
    /// A shelf controller driving several doors.
    Multi,
}

/// What happened to a controller connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "kebab-case")]
pub enum ConnectivityChange {
    Connected,
    Disconnected,
    /// A newer registration with the same identity replaced this session.
    Superseded,
    /// The controller claimed lockers previously routed to another one.
    RoutingTakenOver { previous_controller: ControllerId },
    /// No heartbeat arrived within the liveness window.
    TimedOut,
}

/// Every notification the hub emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LockerEvent {
    /// Per-locker: the door was (or was reported) locked or unlocked.
    LockStatus {
        locker_id: LockerId,
        status: LockStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<LockOrigin>,
    },

    /// Per-locker: indicator colour changed.
    LedStatus { locker_id: LockerId, color: LedColor },

    /// Per-locker: item sensor reading.
    ItemStatus { locker_id: LockerId, item_present: bool },

    /// Administrative: a controller connected, disconnected or took over routing.
    ConnectivityChanged {
        controller_id: ControllerId,
        kind: ControllerKind,
        #[serde(flatten)]
        change: ConnectivityChange,
        lockers: Vec<LockerId>,
    },

    /// Administrative: a locker changed logical state.
    RackStatus {
        locker_id: LockerId,
        from: LockState,
        to: LockState,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<LockOrigin>,
    },

    /// Administrative: the item sensor reports an empty compartment.
    RefillNeeded { locker_id: LockerId },

    /// Administrative: the auto-lock timer fired but the lock command
    /// could not be delivered. Needs an operator.
    AutoLockFailed { locker_id: LockerId, reason: String },
}

impl LockerEvent {
    /// Wire name of the event (matches the serialized `event` tag).
    pub fn name(&self) -> &'static str {
        match self {
            LockerEvent::LockStatus { .. } => EVENT_LOCK_STATUS,
            LockerEvent::LedStatus { .. } => EVENT_LED_STATUS,
            LockerEvent::ItemStatus { .. } => EVENT_ITEM_STATUS,
            LockerEvent::ConnectivityChanged { .. } => EVENT_CONNECTIVITY_CHANGED,
            LockerEvent::RackStatus { .. } => EVENT_RACK_STATUS,
            LockerEvent::RefillNeeded { .. } => EVENT_REFILL_NEEDED,
            LockerEvent::AutoLockFailed { .. } => EVENT_AUTO_LOCK_FAILED,
        }
    }
}
