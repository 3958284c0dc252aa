//! Connection Registry: live controller sessions keyed by identity.
//!
//! The registry is the only writer of the [`RoutingTable`]. Every method
//! that changes routing takes the registry lock first and the routing lock
//! second, so a registration or disconnect is applied to both as one step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rackhub_core::types::{ControllerId, DoorIndex, LockerId, Timestamp};
use rackhub_events::{ConnectivityChange, ControllerKind, EventBus, LockerEvent};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::messages::{Heartbeat, OutboundMessage, ShelfRegistration, SingleRegistration};
use crate::routing::{RoutingTable, SessionHandle};

// ---------------------------------------------------------------------------
// Session data
// ---------------------------------------------------------------------------

/// Last reported sub-state of one door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorState {
    pub locker_id: LockerId,
    pub door_index: Option<DoorIndex>,
    pub locked: bool,
    pub item_present: bool,
}

/// What a controller announced when it registered.
#[derive(Debug, Clone)]
pub struct Registration {
    pub controller_id: ControllerId,
    pub kind: ControllerKind,
    pub doors: Vec<DoorState>,
    pub ip: Option<String>,
}

impl From<&SingleRegistration> for Registration {
    fn from(msg: &SingleRegistration) -> Self {
        Self {
            controller_id: ControllerId::from(msg.controller_id.as_str()),
            kind: ControllerKind::Single,
            doors: vec![DoorState {
                locker_id: msg.locker_id(),
                door_index: None,
                locked: msg.is_locked,
                item_present: msg.item_present,
            }],
            ip: None,
        }
    }
}

impl TryFrom<&ShelfRegistration> for Registration {
    type Error = HubError;

    fn try_from(msg: &ShelfRegistration) -> Result<Self, Self::Error> {
        let doors = msg
            .racks
            .iter()
            .enumerate()
            .map(|(index, rack)| {
                let door_index = DoorIndex::try_from(index).map_err(|_| {
                    HubError::Malformed(format!(
                        "shelf {} lists more doors than can be addressed",
                        msg.shelf_id
                    ))
                })?;
                Ok(DoorState {
                    locker_id: LockerId::from(rack.rack_id.as_str()),
                    door_index: Some(door_index),
                    locked: rack.is_locked,
                    item_present: rack.item_present,
                })
            })
            .collect::<Result<Vec<_>, HubError>>()?;
        Ok(Self {
            controller_id: ControllerId::from(msg.shelf_id.as_str()),
            kind: ControllerKind::Multi,
            doors,
            ip: msg.ip.clone(),
        })
    }
}

/// One live controller connection.
struct ControllerSession {
    handle: SessionHandle,
    kind: ControllerKind,
    doors: Vec<DoorState>,
    ip: Option<String>,
    rssi: Option<i32>,
    uptime_secs: Option<u64>,
    connected_at: Timestamp,
    last_heartbeat: Timestamp,
    /// Monotonic twin of `last_heartbeat` used for liveness checks.
    last_seen: Instant,
    outbound: mpsc::Sender<OutboundMessage>,
    /// Cancelling this asks the transport to drop the connection.
    closer: CancellationToken,
}

impl ControllerSession {
    fn locker_ids(&self) -> Vec<LockerId> {
        self.doors.iter().map(|d| d.locker_id.clone()).collect()
    }

    fn door_mut(&mut self, locker_id: &LockerId) -> Option<&mut DoorState> {
        self.doors.iter_mut().find(|d| &d.locker_id == locker_id)
    }
}

/// Read-only view of a session, for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub controller_id: ControllerId,
    pub kind: ControllerKind,
    pub doors: Vec<DoorState>,
    pub ip: Option<String>,
    pub rssi: Option<i32>,
    pub uptime_secs: Option<u64>,
    pub connected_at: Timestamp,
    pub last_heartbeat: Timestamp,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub handle: SessionHandle,
    pub lockers: Vec<LockerId>,
    /// Session with the same identity that this one replaced.
    pub superseded: Option<SessionHandle>,
    /// Lockers taken over from other controllers, grouped by previous owner.
    pub taken_over: Vec<(ControllerId, Vec<LockerId>)>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ControllerId, ControllerSession>>,
    routing: Arc<RoutingTable>,
    bus: Arc<EventBus>,
}

impl ConnectionRegistry {
    pub fn new(routing: Arc<RoutingTable>, bus: Arc<EventBus>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            routing,
            bus,
        }
    }

    /// Register a controller and bind every locker it serves.
    ///
    /// A live session with the same identity is closed and replaced. A
    /// locker already routed to a different controller is taken over.
    pub async fn register(
        &self,
        registration: Registration,
        outbound: mpsc::Sender<OutboundMessage>,
        closer: CancellationToken,
    ) -> Registered {
        let handle = SessionHandle::new(registration.controller_id.clone());
        let now = Utc::now();
        let lockers: Vec<LockerId> = registration
            .doors
            .iter()
            .map(|d| d.locker_id.clone())
            .collect();

        let mut sessions = self.sessions.write().await;

        let mut superseded = None;
        if let Some(old) = sessions.remove(&registration.controller_id) {
            tracing::warn!(
                controller_id = %registration.controller_id,
                error = %HubError::DuplicateRegistration(registration.controller_id.clone()),
                "Superseding stale controller session",
            );
            old.closer.cancel();
            let old_lockers = old.locker_ids();
            self.routing.unbind_all(&old_lockers, &old.handle).await;
            self.publish_connectivity(
                &old.handle.controller_id,
                old.kind,
                ConnectivityChange::Superseded,
                old_lockers,
            );
            superseded = Some(old.handle);
        }

        let mut taken_over: Vec<(ControllerId, Vec<LockerId>)> = Vec::new();
        for door in &registration.doors {
            let previous = self
                .routing
                .bind(door.locker_id.clone(), handle.clone(), door.door_index)
                .await;
            let Some(previous) = previous else { continue };
            let previous_id = previous.session.controller_id;
            if previous_id == handle.controller_id {
                continue;
            }
            if let Some(other) = sessions.get_mut(&previous_id) {
                other.doors.retain(|d| d.locker_id != door.locker_id);
            }
            match taken_over.iter_mut().find(|(id, _)| *id == previous_id) {
                Some((_, ids)) => ids.push(door.locker_id.clone()),
                None => taken_over.push((previous_id, vec![door.locker_id.clone()])),
            }
        }

        sessions.insert(
            handle.controller_id.clone(),
            ControllerSession {
                handle: handle.clone(),
                kind: registration.kind,
                doors: registration.doors,
                ip: registration.ip,
                rssi: None,
                uptime_secs: None,
                connected_at: now,
                last_heartbeat: now,
                last_seen: Instant::now(),
                outbound,
                closer,
            },
        );
        drop(sessions);

        tracing::info!(
            controller_id = %handle.controller_id,
            kind = ?registration.kind,
            lockers = lockers.len(),
            "Controller registered",
        );
        self.publish_connectivity(
            &handle.controller_id,
            registration.kind,
            ConnectivityChange::Connected,
            lockers.clone(),
        );
        for (previous_controller, ids) in &taken_over {
            tracing::warn!(
                controller_id = %handle.controller_id,
                previous_controller = %previous_controller,
                lockers = ?ids,
                "Controller took over routing from another controller",
            );
            self.publish_connectivity(
                &handle.controller_id,
                registration.kind,
                ConnectivityChange::RoutingTakenOver {
                    previous_controller: previous_controller.clone(),
                },
                ids.clone(),
            );
        }

        Registered {
            handle,
            lockers,
            superseded,
            taken_over,
        }
    }

    /// Record a heartbeat sent on the connection that owns `handle`.
    ///
    /// Ignored when `handle` is no longer the live session or when the
    /// heartbeat names a different identity. Returns `false` in both cases.
    pub async fn heartbeat(&self, handle: &SessionHandle, heartbeat: &Heartbeat) -> bool {
        if heartbeat.controller_id != handle.controller_id.as_str() {
            tracing::warn!(
                controller_id = %handle.controller_id,
                claimed = %heartbeat.controller_id,
                "Heartbeat names another controller",
            );
            return false;
        }
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions
            .get_mut(&handle.controller_id)
            .filter(|s| s.handle == *handle)
        else {
            tracing::debug!(controller_id = %handle.controller_id, "Heartbeat from stale session");
            return false;
        };

        session.last_heartbeat = Utc::now();
        session.last_seen = Instant::now();
        if heartbeat.rssi.is_some() {
            session.rssi = heartbeat.rssi;
        }
        if heartbeat.uptime_secs.is_some() {
            session.uptime_secs = heartbeat.uptime_secs;
        }
        if let Some(doors) = &heartbeat.doors {
            for (position, report) in doors.iter().enumerate() {
                let door = match &report.rack_id {
                    Some(rack_id) => session.door_mut(&LockerId::from(rack_id.as_str())),
                    None => session.doors.get_mut(position),
                };
                if let Some(door) = door {
                    door.locked = report.locked;
                    door.item_present = report.item;
                }
            }
        }
        true
    }

    /// Refresh liveness for a session without changing anything else.
    pub async fn touch(&self, handle: &SessionHandle) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&handle.controller_id) {
            if session.handle == *handle {
                session.last_seen = Instant::now();
                session.last_heartbeat = Utc::now();
            }
        }
    }

    /// Store a door's reported sub-state on the session that reported it.
    ///
    /// Returns `false` when `handle` is stale or does not serve the locker.
    pub async fn record_door(
        &self,
        handle: &SessionHandle,
        locker_id: &LockerId,
        locked: bool,
        item_present: bool,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&handle.controller_id) else {
            return false;
        };
        if session.handle != *handle {
            return false;
        }
        match session.door_mut(locker_id) {
            Some(door) => {
                door.locked = locked;
                door.item_present = item_present;
                true
            }
            None => false,
        }
    }

    /// Remove a session after its connection closed.
    ///
    /// No-op when `handle` no longer names the live session (it was
    /// superseded or reaped). Returns the lockers the session served.
    pub async fn on_disconnect(&self, handle: &SessionHandle) -> Option<Vec<LockerId>> {
        self.remove_session(handle, ConnectivityChange::Disconnected)
            .await
    }

    /// Remove sessions that have been silent for longer than `timeout` and
    /// ask their transports to close.
    pub async fn reap_stale(&self, timeout: Duration) -> Vec<SessionHandle> {
        let stale: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.last_seen.elapsed() > timeout)
                .map(|s| s.handle.clone())
                .collect()
        };

        let mut reaped = Vec::with_capacity(stale.len());
        for handle in stale {
            if self
                .remove_session(&handle, ConnectivityChange::TimedOut)
                .await
                .is_some()
            {
                tracing::warn!(controller_id = %handle.controller_id, "Controller heartbeat timed out");
                reaped.push(handle);
            }
        }
        reaped
    }

    /// Outbound queue of a live session.
    pub async fn sender(&self, handle: &SessionHandle) -> Option<mpsc::Sender<OutboundMessage>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&handle.controller_id)
            .filter(|s| s.handle == *handle)
            .map(|s| s.outbound.clone())
    }

    pub async fn snapshot(&self) -> Vec<ControllerSnapshot> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<ControllerSnapshot> = sessions
            .values()
            .map(|s| ControllerSnapshot {
                controller_id: s.handle.controller_id.clone(),
                kind: s.kind,
                doors: s.doors.clone(),
                ip: s.ip.clone(),
                rssi: s.rssi,
                uptime_secs: s.uptime_secs,
                connected_at: s.connected_at,
                last_heartbeat: s.last_heartbeat,
            })
            .collect();
        out.sort_by(|a, b| a.controller_id.cmp(&b.controller_id));
        out
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session's connection. Used during shutdown.
    pub async fn close_all(&self) {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            session.closer.cancel();
        }
    }

    // ---- private helpers ----

    async fn remove_session(
        &self,
        handle: &SessionHandle,
        change: ConnectivityChange,
    ) -> Option<Vec<LockerId>> {
        let mut sessions = self.sessions.write().await;
        let live = sessions
            .get(&handle.controller_id)
            .is_some_and(|s| s.handle == *handle);
        if !live {
            return None;
        }
        let session = sessions.remove(&handle.controller_id)?;
        let served = session.locker_ids();
        self.routing.unbind_all(&served, handle).await;
        drop(sessions);

        if change == ConnectivityChange::TimedOut {
            session.closer.cancel();
        }
        tracing::info!(
            controller_id = %handle.controller_id,
            lockers = served.len(),
            change = ?change,
            "Controller session removed",
        );
        self.publish_connectivity(&handle.controller_id, session.kind, change, served.clone());
        Some(served)
    }

    fn publish_connectivity(
        &self,
        controller_id: &ControllerId,
        kind: ControllerKind,
        change: ConnectivityChange,
        lockers: Vec<LockerId>,
    ) {
        self.bus.publish_admin(LockerEvent::ConnectivityChanged {
            controller_id: controller_id.clone(),
            kind,
            change,
            lockers,
        });
    }
}
