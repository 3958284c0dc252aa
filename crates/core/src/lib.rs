//! Rackhub domain core.
//!
//! Pure types and rules shared by every other crate: locker and
//! controller identifiers, the lock state machine's transition table,
//! and the collaborator traits (state persistence, unlock authorization)
//! that the controller hub consumes. Nothing in here performs I/O.

pub mod error;
pub mod event_names;
pub mod lock_state;
pub mod store;
pub mod types;
