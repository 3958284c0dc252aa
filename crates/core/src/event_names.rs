//! Well-known notification names.
//!
//! These are the `event` discriminators observers see on every
//! notification, and the names used in logs.

/// Per-locker: door locked or unlocked.
pub const EVENT_LOCK_STATUS: &str = "lock-status";

/// Per-locker: indicator colour changed.
pub const EVENT_LED_STATUS: &str = "led-status";

/// Per-locker: item sensor reading.
pub const EVENT_ITEM_STATUS: &str = "item-status";

/// Administrative: controller connected, disconnected, superseded,
/// took over routing or timed out.
pub const EVENT_CONNECTIVITY_CHANGED: &str = "connectivity-changed";

/// Administrative: logical lock state changed.
pub const EVENT_RACK_STATUS: &str = "rack-status";

/// Administrative: compartment reported empty.
pub const EVENT_REFILL_NEEDED: &str = "refill-needed";

/// Administrative: auto-lock could not reach the controller.
pub const EVENT_AUTO_LOCK_FAILED: &str = "auto-lock-failed";
