//! Controller coordination for the locker hub.
//!
//! Physical controllers (single-door units and multi-door shelves) hold a
//! persistent connection to the hub. This crate tracks those connections,
//! routes lock/unlock commands to whichever controller currently serves a
//! locker, enforces the per-locker lock state machine and runs the
//! auto-lock timers. [`LockerHub`] owns all of it.

pub mod autolock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod link;
pub mod memory;
pub mod messages;
pub mod registry;
pub mod routing;
pub mod state_machine;

pub use config::HubConfig;
pub use dispatcher::Delivery;
pub use error::{HubError, HubResult, UnreachableReason};
pub use hub::{LockerHub, LockerSnapshot};
pub use link::ControllerLink;
pub use messages::{Command, InboundMessage, OutboundMessage};
pub use registry::{ControllerSnapshot, DoorState, Registration};
pub use routing::SessionHandle;
