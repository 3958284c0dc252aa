use std::time::Duration;

/// Default auto-lock window after a successful unlock.
pub const DEFAULT_AUTO_LOCK_DURATION: Duration = Duration::from_secs(30);

/// Default time a command may wait for room in a controller's queue.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default silence after which a controller session is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default period of the liveness sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(25);

/// Default capacity of each controller's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// Tunables for [`LockerHub`](crate::hub::LockerHub).
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub auto_lock_duration: Duration,
    pub command_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            auto_lock_duration: DEFAULT_AUTO_LOCK_DURATION,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}
