use std::time::Duration;

use rackhub_core::error::StoreError;
use rackhub_core::lock_state::LockState;
use rackhub_core::types::{ControllerId, LockerId};

/// Errors raised by the controller hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A controller registered with an identity that already had a live
    /// session. Never returned to callers: the newer session supersedes
    /// the old one and this is only logged.
    #[error("Controller {0} is already registered")]
    DuplicateRegistration(ControllerId),

    /// No routing entry for the locker, or the transport did not accept
    /// the command in time.
    #[error("Locker {locker_id} is unreachable: {reason}")]
    DeviceUnreachable {
        locker_id: LockerId,
        reason: UnreachableReason,
    },

    /// State-machine precondition failed; nothing changed.
    #[error("Locker {locker_id} is not available (currently {state})")]
    NotAvailable { locker_id: LockerId, state: LockState },

    /// The auto-lock timer fired but the lock command could not be delivered.
    #[error("Auto-lock failed for locker {locker_id}: {reason}")]
    AutoLockFailed { locker_id: LockerId, reason: String },

    /// The unlock authorizer refused the request.
    #[error("Unlock of locker {0} is not authorized")]
    NotAuthorized(LockerId),

    /// No state has ever been recorded for the locker.
    #[error("Locker {0} is unknown")]
    UnknownLocker(LockerId),

    /// Operation does not apply to the locker's current state.
    #[error("Locker {locker_id} cannot {action} while {state}")]
    InvalidState {
        locker_id: LockerId,
        action: &'static str,
        state: LockState,
    },

    /// An inbound controller message was rejected at the boundary.
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a command could not reach a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreachableReason {
    /// No controller currently serves the locker.
    NoRoute,
    /// The controller's outbound queue stayed full past the timeout.
    Timeout(Duration),
    /// The controller connection closed before the command was queued.
    ConnectionClosed,
}

impl std::fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreachableReason::NoRoute => f.write_str("no controller serves it"),
            UnreachableReason::Timeout(t) => {
                write!(f, "transport timed out after {}ms", t.as_millis())
            }
            UnreachableReason::ConnectionClosed => f.write_str("controller connection closed"),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
