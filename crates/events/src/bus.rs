//! In-process, topic-scoped event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Every [`Notification`] carries a [`Scope`]: either a single locker or
//! the administrative group. A [`Subscription`] holds an [`Interest`]
//! (a set of lockers, plus optionally the administrative group) and only
//! yields notifications that match it. The administrative group sees
//! everything.
//!
//! All notifications travel through one channel, so a subscriber observes
//! the notifications of any given locker in the order they were published.

use std::collections::HashSet;

use chrono::Utc;
use rackhub_core::types::{LockerId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::event::LockerEvent;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Audience of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Subscribers of this locker (and the administrative group).
    Locker(LockerId),
    /// The administrative group only.
    Admin,
}

/// A published event plus its audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub scope: Scope,
    #[serde(flatten)]
    pub event: LockerEvent,
    pub timestamp: Timestamp,
}

impl Notification {
    pub fn locker(locker_id: LockerId, event: LockerEvent) -> Self {
        Self {
            scope: Scope::Locker(locker_id),
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn admin(event: LockerEvent) -> Self {
        Self {
            scope: Scope::Admin,
            event,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Interest / Subscription
// ---------------------------------------------------------------------------

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Default)]
pub struct Interest {
    lockers: HashSet<LockerId>,
    admin: bool,
}

impl Interest {
    pub fn admin() -> Self {
        Self {
            lockers: HashSet::new(),
            admin: true,
        }
    }

    pub fn lockers(ids: impl IntoIterator<Item = LockerId>) -> Self {
        Self {
            lockers: ids.into_iter().collect(),
            admin: false,
        }
    }

    pub fn add_locker(&mut self, locker_id: LockerId) {
        self.lockers.insert(locker_id);
    }

    pub fn remove_locker(&mut self, locker_id: &LockerId) {
        self.lockers.remove(locker_id);
    }

    pub fn set_admin(&mut self, admin: bool) {
        self.admin = admin;
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn matches(&self, scope: &Scope) -> bool {
        if self.admin {
            return true;
        }
        match scope {
            Scope::Locker(id) => self.lockers.contains(id),
            Scope::Admin => false,
        }
    }
}

/// A filtered receiver on the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
    interest: Interest,
}

impl Subscription {
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn interest_mut(&mut self) -> &mut Interest {
        &mut self.interest
    }

    /// Wait for the next notification matching this subscription's interest.
    ///
    /// Returns `None` once the bus has been dropped. A lagging subscriber
    /// skips the overwritten notifications and keeps going.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => {
                    if self.interest.matches(&notification.scope) {
                        return Some(notification);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Subscriber lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    ///
    /// Returns `None` when no matching notification is queued right now.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => {
                    if self.interest.matches(&notification.scope) {
                        return Some(notification);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Subscriber lagged, notifications dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Designed to be shared via `Arc<EventBus>`. Publishing never blocks and
/// never fails; with no subscribers the notification is dropped.
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed notifications are
    /// dropped for slow subscribers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, notification: Notification) {
        tracing::trace!(event = notification.event.name(), scope = ?notification.scope, "Publishing");
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(notification);
    }

    /// Publish an event scoped to one locker.
    pub fn publish_locker(&self, locker_id: &LockerId, event: LockerEvent) {
        self.publish(Notification::locker(locker_id.clone(), event));
    }

    /// Publish an event to the administrative group.
    pub fn publish_admin(&self, event: LockerEvent) {
        self.publish(Notification::admin(event));
    }

    pub fn subscribe(&self, interest: Interest) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            interest,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
