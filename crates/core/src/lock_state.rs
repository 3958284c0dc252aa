//! Locker lock states and the transition table between them.
//!
//! The normal cycle is `available -> unlocking -> occupied -> available`.
//! Any state may fall into `maintenance` on a hardware failure, and only
//! an explicit administrative reset brings a locker back out of it.
//! Connectivity never appears here: a locker stays `occupied` while its
//! controller is briefly offline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical state of one locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Available,
    Unlocking,
    Occupied,
    Maintenance,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Available => "available",
            LockState::Unlocking => "unlocking",
            LockState::Occupied => "occupied",
            LockState::Maintenance => "maintenance",
        }
    }

    /// Indicator colour shown on the door for this state.
    pub fn led_color(self) -> LedColor {
        match self {
            LockState::Available => LedColor::Green,
            LockState::Unlocking => LedColor::Blue,
            LockState::Occupied => LedColor::Red,
            LockState::Maintenance => LedColor::Off,
        }
    }

    /// Apply `trigger` to this state, returning the next state.
    ///
    /// Pure: callers are responsible for serializing access per locker
    /// and for publishing the resulting change.
    pub fn apply(self, trigger: LockTrigger) -> Result<LockState, TransitionError> {
        use LockState::*;
        use LockTrigger::*;

        match (self, trigger) {
            (Available, UnlockRequested) => Ok(Unlocking),
            (_, UnlockRequested) => Err(TransitionError::NotAvailable(self)),
            (Unlocking, UnlockDelivered) => Ok(Occupied),
            (Unlocking, UnlockFailed) => Ok(Maintenance),
            (Occupied, LockCompleted) => Ok(Available),
            (_, HardwareFault) => Ok(Maintenance),
            (Maintenance, AdminReset) => Ok(Available),
            (from, trigger) => Err(TransitionError::Invalid { from, trigger }),
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(LockState::Available),
            "unlocking" => Ok(LockState::Unlocking),
            "occupied" => Ok(LockState::Occupied),
            "maintenance" => Ok(LockState::Maintenance),
            other => Err(format!("unknown lock state '{other}'")),
        }
    }
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTrigger {
    /// An authorized caller asked for the door to open.
    UnlockRequested,
    /// The unlock command was accepted by the controller's transport.
    UnlockDelivered,
    /// The unlock command could not be delivered to a routed controller.
    UnlockFailed,
    /// A lock command (manual or automatic) was delivered.
    LockCompleted,
    /// The controller reported a hardware fault.
    HardwareFault,
    /// An operator cleared a maintenance hold.
    AdminReset,
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("locker is not available (currently {0})")]
    NotAvailable(LockState),

    #[error("cannot apply {trigger:?} while {from}")]
    Invalid { from: LockState, trigger: LockTrigger },
}

/// LED colours understood by the door indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedColor {
    Green,
    Blue,
    Red,
    Off,
}

/// Who asked for a lock or unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOrigin {
    /// A paying customer acting on their own session.
    User,
    /// An operator acting from the administrative dashboard.
    Admin,
    /// The auto-lock timer.
    Auto,
}
