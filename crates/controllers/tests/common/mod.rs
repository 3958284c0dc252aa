#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rackhub_controllers::memory::{AllowAllAuthorizer, InMemoryLockStateStore};
use rackhub_controllers::{ControllerLink, HubConfig, HubResult, LockerHub, OutboundMessage};
use rackhub_core::store::UnlockAuthorizer;
use rackhub_events::{EventBus, LockerEvent, Subscription};
use serde_json::json;
use tokio::sync::mpsc;

pub struct Harness {
    pub hub: Arc<LockerHub>,
    pub bus: Arc<EventBus>,
    pub store: Arc<InMemoryLockStateStore>,
}

/// Hub settings for tests: 30s auto-lock and a liveness window long
/// enough that the sweeper never interferes unless a test asks for it.
pub fn test_config() -> HubConfig {
    HubConfig {
        auto_lock_duration: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(3600),
        ..HubConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), Arc::new(AllowAllAuthorizer))
}

pub fn harness_with(config: HubConfig, authorizer: Arc<dyn UnlockAuthorizer>) -> Harness {
    let bus = Arc::new(EventBus::default());
    let store = Arc::new(InMemoryLockStateStore::new());
    let hub = LockerHub::start(config, bus.clone(), store.clone(), authorizer);
    Harness { hub, bus, store }
}

/// A controller driven from the test instead of a socket.
pub struct FakeController {
    pub link: ControllerLink,
    pub rx: mpsc::Receiver<OutboundMessage>,
}

impl FakeController {
    pub async fn connect(hub: &Arc<LockerHub>, registration: serde_json::Value) -> Self {
        let (link, rx) = hub.open_link();
        let mut controller = Self { link, rx };
        controller
            .send(registration)
            .await
            .expect("registration should be accepted");
        let ack = controller.rx.try_recv().expect("registration ack");
        assert!(matches!(ack, OutboundMessage::Registered { .. }));
        controller
    }

    pub async fn single(hub: &Arc<LockerHub>, controller_id: &str, locker_id: &str) -> Self {
        Self::connect(
            hub,
            json!({
                "type": "register",
                "controller_id": controller_id,
                "locker_id": locker_id,
                "is_locked": true,
                "item_present": true,
            }),
        )
        .await
    }

    pub async fn shelf(hub: &Arc<LockerHub>, shelf_id: &str, racks: &[&str]) -> Self {
        let racks: Vec<_> = racks
            .iter()
            .map(|id| json!({ "rack_id": id, "is_locked": true, "item_present": true }))
            .collect();
        Self::connect(
            hub,
            json!({ "type": "shelf_register", "shelf_id": shelf_id, "racks": racks }),
        )
        .await
    }

    pub async fn send(&mut self, message: serde_json::Value) -> HubResult<()> {
        self.link.on_text(&message.to_string()).await
    }

    /// Next queued outbound message, if any.
    pub fn next(&mut self) -> Option<OutboundMessage> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        std::iter::from_fn(|| self.next()).collect()
    }
}

/// Let spawned tasks that are already runnable make progress.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Everything queued on a subscription right now.
pub fn drain_events(sub: &mut Subscription) -> Vec<LockerEvent> {
    std::iter::from_fn(|| sub.try_recv()).map(|n| n.event).collect()
}

pub fn event_names(events: &[LockerEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}
