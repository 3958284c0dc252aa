//! Rackhub broadcast channel.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, scoped per locker and administrative group.
//! - [`LockerEvent`] -- every notification the controller hub emits.
//! - [`Subscription`] -- a receiver filtered by an [`Interest`].

pub mod bus;
pub mod event;

pub use bus::{EventBus, Interest, Notification, Scope, Subscription};
pub use event::{ConnectivityChange, ControllerKind, LockStatus, LockerEvent};
