//! The locker hub: one owned service holding every piece of controller state.
//!
//! [`LockerHub`] wires the registry, routing table, dispatcher, lock state
//! machine and auto-lock scheduler together and exposes the operations
//! transports and HTTP handlers call. It is created once at startup via
//! [`LockerHub::start`] and shared as `Arc<LockerHub>`.
//!
//! Command operations (`unlock`, `lock`, `reset`) hold a locker's guard
//! across command delivery. They are not cancel-safe: callers on a
//! connection task should spawn them rather than race them in a `select!`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rackhub_core::lock_state::{LedColor, LockOrigin, LockState, LockTrigger};
use rackhub_core::store::{LockStateStore, UnlockAuthorizer};
use rackhub_core::types::{ControllerId, DoorIndex, LockerId};
use rackhub_events::{EventBus, LockStatus, LockerEvent};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::autolock::{AutoLockFired, AutoLockScheduler};
use crate::config::HubConfig;
use crate::dispatcher::{CommandDispatcher, Delivery};
use crate::error::{HubError, HubResult};
use crate::link::ControllerLink;
use crate::messages::{Command, Heartbeat, OutboundMessage, StatusReport};
use crate::registry::{ConnectionRegistry, ControllerSnapshot, Registered, Registration};
use crate::routing::{RoutingEntry, RoutingTable, SessionHandle};
use crate::state_machine::LockStateMachine;

/// Everything known about one locker right now.
#[derive(Debug, Clone, Serialize)]
pub struct LockerSnapshot {
    pub locker_id: LockerId,
    pub state: LockState,
    pub led: LedColor,
    pub hardware_locked: bool,
    pub item_present: bool,
    pub reachable: bool,
    pub controller_id: Option<ControllerId>,
    pub door_index: Option<DoorIndex>,
    /// Milliseconds until the armed auto-lock fires.
    pub auto_lock_remaining_ms: Option<u64>,
}

pub struct LockerHub {
    config: HubConfig,
    bus: Arc<EventBus>,
    routing: Arc<RoutingTable>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: CommandDispatcher,
    machine: LockStateMachine,
    autolock: AutoLockScheduler,
    authorizer: Arc<dyn UnlockAuthorizer>,
    /// Master token, cancelled on shutdown. Every link token is a child.
    cancel: CancellationToken,
}

impl LockerHub {
    /// Build the hub and spawn its background tasks (auto-lock fire loop
    /// and liveness sweeper). Must be called inside a Tokio runtime.
    pub fn start(
        config: HubConfig,
        bus: Arc<EventBus>,
        store: Arc<dyn LockStateStore>,
        authorizer: Arc<dyn UnlockAuthorizer>,
    ) -> Arc<Self> {
        let routing = Arc::new(RoutingTable::new());
        let registry = Arc::new(ConnectionRegistry::new(routing.clone(), bus.clone()));
        let dispatcher =
            CommandDispatcher::new(registry.clone(), routing.clone(), config.command_timeout);
        let machine = LockStateMachine::new(store, bus.clone());
        let (autolock, fired_rx) = AutoLockScheduler::new();
        let cancel = CancellationToken::new();

        let hub = Arc::new(Self {
            config,
            bus,
            routing,
            registry,
            dispatcher,
            machine,
            autolock,
            authorizer,
            cancel: cancel.clone(),
        });

        tokio::spawn(fire_loop(Arc::downgrade(&hub), fired_rx, cancel.clone()));
        tokio::spawn(sweep_loop(
            Arc::downgrade(&hub),
            hub.config.sweep_interval,
            cancel,
        ));

        tracing::info!(
            auto_lock_secs = hub.config.auto_lock_duration.as_secs(),
            command_timeout_ms = hub.config.command_timeout.as_millis() as u64,
            "Locker hub started",
        );
        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Open a transport adapter for a new controller connection.
    ///
    /// The returned receiver yields every message the hub wants written to
    /// the connection.
    pub fn open_link(self: &Arc<Self>) -> (ControllerLink, mpsc::Receiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let link = ControllerLink::new(self.clone(), outbound_tx, self.cancel.child_token());
        (link, outbound_rx)
    }

    // ---- connection registry ----

    /// Register a controller, bind its lockers and record the hardware
    /// state it announced.
    pub async fn register(
        &self,
        registration: Registration,
        outbound: mpsc::Sender<OutboundMessage>,
        closer: CancellationToken,
    ) -> Registered {
        let doors = registration.doors.clone();
        let registered = self.registry.register(registration, outbound, closer).await;

        for door in doors {
            if let Err(e) = self
                .record_hardware(&door.locker_id, door.locked, door.item_present)
                .await
            {
                tracing::error!(locker_id = %door.locker_id, error = %e, "Failed to load locker state");
            }
        }
        registered
    }

    pub async fn heartbeat(&self, session: &SessionHandle, heartbeat: &Heartbeat) -> bool {
        self.registry.heartbeat(session, heartbeat).await
    }

    /// Remove a session whose connection closed. Armed auto-locks for its
    /// lockers stay armed.
    pub async fn on_disconnect(&self, session: &SessionHandle) -> Option<Vec<LockerId>> {
        self.registry.on_disconnect(session).await
    }

    pub async fn touch(&self, session: &SessionHandle) {
        self.registry.touch(session).await;
    }

    /// Apply a status report from the session serving the locker.
    pub async fn on_status(&self, session: &SessionHandle, report: &StatusReport) -> HubResult<()> {
        let locker_id = LockerId::from(report.rack_id.as_str());
        let served = self
            .registry
            .record_door(session, &locker_id, report.is_locked, report.item_present)
            .await;
        if !served {
            return Err(HubError::Malformed(format!(
                "controller {} does not serve locker {locker_id}",
                session.controller_id
            )));
        }

        let mut guard = self.machine.lock(&locker_id).await?;
        guard.set_hardware(report.is_locked, report.item_present);

        self.bus.publish_locker(
            &locker_id,
            LockerEvent::LockStatus {
                locker_id: locker_id.clone(),
                status: LockStatus::from_locked(report.is_locked),
                origin: None,
            },
        );
        self.bus.publish_locker(
            &locker_id,
            LockerEvent::ItemStatus {
                locker_id: locker_id.clone(),
                item_present: report.item_present,
            },
        );
        if !report.item_present {
            self.bus.publish_admin(LockerEvent::RefillNeeded {
                locker_id: locker_id.clone(),
            });
        }

        if let Some(fault) = &report.fault {
            tracing::error!(
                locker_id = %locker_id,
                controller_id = %session.controller_id,
                fault = %fault,
                "Controller reported hardware fault",
            );
            guard.transition(LockTrigger::HardwareFault, None)?;
            self.autolock.cancel(&locker_id).await;
        }

        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(&locker_id, snapshot).await;
        Ok(())
    }

    // ---- commands ----

    /// Open a locker.
    ///
    /// Fails with `NotAvailable` unless the locker is `available`, with
    /// `DeviceUnreachable` (state unchanged) when no controller serves it,
    /// and with `NotAuthorized` when the authorizer refuses. Once the
    /// locker has entered `unlocking`, a delivery failure moves it to
    /// `maintenance`; success moves it to `occupied` and arms the auto-lock.
    pub async fn unlock(&self, locker_id: &LockerId, origin: LockOrigin) -> HubResult<Delivery> {
        let state = self.machine.peek(locker_id).await?;
        if state != LockState::Available {
            return Err(HubError::NotAvailable {
                locker_id: locker_id.clone(),
                state,
            });
        }
        // Fail fast before the authorizer consumes anything.
        self.dispatcher.resolve(locker_id).await?;

        if !self.authorizer.authorize(locker_id, origin).await? {
            tracing::info!(locker_id = %locker_id, origin = ?origin, "Unlock refused");
            return Err(HubError::NotAuthorized(locker_id.clone()));
        }

        let mut guard = self.machine.lock(locker_id).await?;
        if guard.state() != LockState::Available {
            return Err(HubError::NotAvailable {
                locker_id: locker_id.clone(),
                state: guard.state(),
            });
        }
        let route = self.dispatcher.resolve(locker_id).await?;

        guard.transition(LockTrigger::UnlockRequested, Some(origin))?;
        let result = self.dispatcher.deliver(&route, locker_id, Command::Unlock).await;
        match &result {
            Ok(_) => {
                guard.transition(LockTrigger::UnlockDelivered, Some(origin))?;
                self.autolock
                    .arm(locker_id.clone(), self.config.auto_lock_duration)
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    locker_id = %locker_id,
                    error = %e,
                    "Unlock failed on a routed controller, moving to maintenance",
                );
                guard.transition(LockTrigger::UnlockFailed, Some(origin))?;
            }
        }

        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(locker_id, snapshot).await;
        result
    }

    /// Lock a locker by hand.
    ///
    /// The lock command is always sent. Only an `occupied` locker changes
    /// state (to `available`), and that also cancels its auto-lock. When
    /// the command cannot be delivered nothing changes and the auto-lock
    /// stays armed.
    pub async fn lock(&self, locker_id: &LockerId, origin: LockOrigin) -> HubResult<Delivery> {
        let mut guard = self.machine.lock(locker_id).await?;
        let delivery = self.dispatcher.send(locker_id, Command::Lock).await?;

        if guard.state() == LockState::Occupied {
            guard.transition(LockTrigger::LockCompleted, Some(origin))?;
            self.autolock.cancel(locker_id).await;
        } else {
            tracing::debug!(
                locker_id = %locker_id,
                state = %guard.state(),
                "Lock sent without a state change",
            );
        }

        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(locker_id, snapshot).await;
        Ok(delivery)
    }

    /// Administrative reset out of `maintenance`.
    ///
    /// Fails with `UnknownLocker` for a locker that has never been
    /// registered or stored.
    pub async fn reset(&self, locker_id: &LockerId) -> HubResult<LockState> {
        if self.machine.find(locker_id).await?.is_none()
            && self.routing.resolve(locker_id).await.is_none()
        {
            return Err(HubError::UnknownLocker(locker_id.clone()));
        }
        let mut guard = self.machine.lock(locker_id).await?;
        let state = guard.transition(LockTrigger::AdminReset, Some(LockOrigin::Admin))?;
        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(locker_id, snapshot).await;
        Ok(state)
    }

    // ---- snapshots ----

    pub async fn controllers(&self) -> Vec<ControllerSnapshot> {
        self.registry.snapshot().await
    }

    pub async fn locker(&self, locker_id: &LockerId) -> HubResult<LockerSnapshot> {
        let route = self.routing.resolve(locker_id).await;
        let stored = match self.machine.find(locker_id).await? {
            Some(stored) => stored,
            None if route.is_some() => Default::default(),
            None => return Err(HubError::UnknownLocker(locker_id.clone())),
        };
        let remaining = self.autolock.remaining(locker_id).await;

        Ok(LockerSnapshot {
            locker_id: locker_id.clone(),
            state: stored.state,
            led: stored.state.led_color(),
            hardware_locked: stored.hardware_locked,
            item_present: stored.item_present,
            reachable: route.is_some(),
            controller_id: route.as_ref().map(|r| r.session.controller_id.clone()),
            door_index: route.and_then(|r| r.door_index),
            auto_lock_remaining_ms: remaining.map(|d| d.as_millis() as u64),
        })
    }

    pub async fn state(&self, locker_id: &LockerId) -> HubResult<LockState> {
        self.machine.peek(locker_id).await
    }

    pub async fn resolve(&self, locker_id: &LockerId) -> Option<RoutingEntry> {
        self.routing.resolve(locker_id).await
    }

    pub async fn auto_lock_remaining(&self, locker_id: &LockerId) -> Option<Duration> {
        self.autolock.remaining(locker_id).await
    }

    pub async fn auto_lock_armed_count(&self) -> usize {
        self.autolock.armed_count().await
    }

    pub async fn controller_count(&self) -> usize {
        self.registry.session_count().await
    }

    pub async fn route_count(&self) -> usize {
        self.routing.len().await
    }

    // ---- lifecycle ----

    /// Reap sessions whose heartbeat is older than the configured timeout.
    pub async fn sweep(&self) -> Vec<SessionHandle> {
        self.registry.reap_stale(self.config.heartbeat_timeout).await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop background tasks, cancel every auto-lock and close every
    /// controller connection.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down locker hub");
        self.cancel.cancel();
        self.autolock.cancel_all().await;
        self.registry.close_all().await;
        tracing::info!("Locker hub shut down complete");
    }

    // ---- private helpers ----

    async fn record_hardware(&self, locker_id: &LockerId, locked: bool, item_present: bool) -> HubResult<()> {
        let mut guard = self.machine.lock(locker_id).await?;
        if !guard.set_hardware(locked, item_present) {
            return Ok(());
        }
        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(locker_id, snapshot).await;
        Ok(())
    }

    async fn on_auto_lock_fired(&self, fired: AutoLockFired) {
        let locker_id = fired.locker_id;
        let mut guard = match self.machine.lock(&locker_id).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(locker_id = %locker_id, error = %e, "Auto-lock could not load locker");
                return;
            }
        };

        if !self.autolock.claim(&locker_id, fired.generation).await {
            tracing::debug!(locker_id = %locker_id, "Stale auto-lock fire ignored");
            return;
        }
        if guard.state() != LockState::Occupied {
            tracing::debug!(
                locker_id = %locker_id,
                state = %guard.state(),
                "Auto-lock fired on a locker that is no longer occupied",
            );
            return;
        }

        match self.dispatcher.send(&locker_id, Command::Lock).await {
            Ok(_) => {
                if let Err(e) = guard.transition(LockTrigger::LockCompleted, Some(LockOrigin::Auto)) {
                    tracing::error!(locker_id = %locker_id, error = %e, "Auto-lock transition rejected");
                }
            }
            Err(e) => {
                let failure = HubError::AutoLockFailed {
                    locker_id: locker_id.clone(),
                    reason: e.to_string(),
                };
                tracing::error!(locker_id = %locker_id, error = %failure, "Auto-lock needs operator attention");
                self.bus.publish_admin(LockerEvent::AutoLockFailed {
                    locker_id: locker_id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let snapshot = guard.snapshot();
        drop(guard);
        self.machine.persist(&locker_id, snapshot).await;
    }
}

/// Hand each timer fire to the hub on its own task so a slow controller
/// does not hold up other lockers' fires.
async fn fire_loop(
    hub: Weak<LockerHub>,
    mut fired_rx: mpsc::UnboundedReceiver<AutoLockFired>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            fired = fired_rx.recv() => {
                let Some(fired) = fired else { break };
                let Some(hub) = hub.upgrade() else { break };
                tokio::spawn(async move { hub.on_auto_lock_fired(fired).await });
            }
        }
    }
    tracing::debug!("Auto-lock fire loop stopped");
}

async fn sweep_loop(hub: Weak<LockerHub>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(hub) = hub.upgrade() else { break };
                let reaped = hub.sweep().await;
                if !reaped.is_empty() {
                    tracing::info!(count = reaped.len(), "Reaped silent controllers");
                }
            }
        }
    }
    tracing::debug!("Liveness sweeper stopped");
}
