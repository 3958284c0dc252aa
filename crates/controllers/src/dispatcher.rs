//! Command Dispatcher: resolve a locker to its controller and queue a command.
//!
//! Delivery means the command was accepted by the controller's outbound
//! queue. Hardware confirmation arrives later as a status report.

use std::sync::Arc;
use std::time::Duration;

use rackhub_core::types::{ControllerId, DoorIndex, LockerId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::error::{HubError, HubResult, UnreachableReason};
use crate::messages::{Command, OutboundMessage};
use crate::registry::ConnectionRegistry;
use crate::routing::{RoutingTable, SessionHandle};

/// A resolved path to one door.
#[derive(Debug, Clone)]
pub struct Route {
    pub session: SessionHandle,
    pub door_index: Option<DoorIndex>,
    sender: mpsc::Sender<OutboundMessage>,
}

/// Transport-level acknowledgement of a queued command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub command: Command,
    pub locker_id: LockerId,
    pub controller_id: ControllerId,
    pub door_index: Option<DoorIndex>,
}

pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    routing: Arc<RoutingTable>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, routing: Arc<RoutingTable>, timeout: Duration) -> Self {
        Self {
            registry,
            routing,
            timeout,
        }
    }

    /// Find the session and door currently responsible for `locker_id`.
    pub async fn resolve(&self, locker_id: &LockerId) -> HubResult<Route> {
        let unreachable = || HubError::DeviceUnreachable {
            locker_id: locker_id.clone(),
            reason: UnreachableReason::NoRoute,
        };

        let entry = self.routing.resolve(locker_id).await.ok_or_else(unreachable)?;
        let sender = self
            .registry
            .sender(&entry.session)
            .await
            .ok_or_else(unreachable)?;

        Ok(Route {
            session: entry.session,
            door_index: entry.door_index,
            sender,
        })
    }

    /// Queue `command` on an already resolved route.
    ///
    /// Waits at most the transport timeout for room in the queue.
    pub async fn deliver(&self, route: &Route, locker_id: &LockerId, command: Command) -> HubResult<Delivery> {
        let message = OutboundMessage::command(command, locker_id.clone(), route.door_index);

        match route.sender.send_timeout(message, self.timeout).await {
            Ok(()) => {
                tracing::debug!(
                    locker_id = %locker_id,
                    controller_id = %route.session.controller_id,
                    door_index = ?route.door_index,
                    command = %command,
                    "Command queued",
                );
                Ok(Delivery {
                    command,
                    locker_id: locker_id.clone(),
                    controller_id: route.session.controller_id.clone(),
                    door_index: route.door_index,
                })
            }
            Err(e) => {
                let reason = match e {
                    SendTimeoutError::Timeout(_) => UnreachableReason::Timeout(self.timeout),
                    SendTimeoutError::Closed(_) => UnreachableReason::ConnectionClosed,
                };
                tracing::warn!(
                    locker_id = %locker_id,
                    controller_id = %route.session.controller_id,
                    command = %command,
                    reason = %reason,
                    "Command delivery failed",
                );
                Err(HubError::DeviceUnreachable {
                    locker_id: locker_id.clone(),
                    reason,
                })
            }
        }
    }

    /// Resolve and deliver in one step.
    ///
    /// Duplicate sends are not suppressed; controllers de-duplicate.
    pub async fn send(&self, locker_id: &LockerId, command: Command) -> HubResult<Delivery> {
        let route = self.resolve(locker_id).await?;
        self.deliver(&route, locker_id, command).await
    }
}
