//! Transport adapter for one controller connection.
//!
//! A WebSocket (or any message-oriented) handler owns one
//! [`ControllerLink`], feeds it every text frame, writes out whatever
//! arrives on the paired outbound receiver, and drops the connection when
//! [`closer`](ControllerLink::closer) is cancelled (superseded, timed out
//! or hub shutdown). When the connection ends it hands the outbound
//! receiver back to [`close`](ControllerLink::close).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, HubResult};
use crate::hub::LockerHub;
use crate::messages::{parse_inbound, InboundMessage, OutboundMessage};
use crate::registry::Registration;
use crate::routing::SessionHandle;

pub struct ControllerLink {
    hub: Arc<LockerHub>,
    session: Option<SessionHandle>,
    outbound: mpsc::Sender<OutboundMessage>,
    closer: CancellationToken,
}

impl ControllerLink {
    pub(crate) fn new(
        hub: Arc<LockerHub>,
        outbound: mpsc::Sender<OutboundMessage>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            hub,
            session: None,
            outbound,
            closer,
        }
    }

    /// Session registered on this connection, if any.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Cancelled when the hub wants this connection dropped.
    pub fn closer(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames are rejected without touching hub state; the
    /// connection should stay up.
    pub async fn on_text(&mut self, text: &str) -> HubResult<()> {
        let message = parse_inbound(text)?;
        if let Some(session) = &self.session {
            self.hub.touch(session).await;
        }

        match message {
            InboundMessage::Register(msg) => self.register(Registration::from(&msg)).await,
            InboundMessage::ShelfRegister(msg) => {
                self.register(Registration::try_from(&msg)?).await
            }
            InboundMessage::Heartbeat(msg) => {
                match &self.session {
                    Some(session) => {
                        self.hub.heartbeat(session, &msg).await;
                    }
                    None => {
                        tracing::debug!(controller_id = %msg.controller_id, "Heartbeat before registration");
                    }
                }
                Ok(())
            }
            InboundMessage::Status(report) => {
                let Some(session) = &self.session else {
                    return Err(HubError::Malformed(
                        "status report before registration".into(),
                    ));
                };
                self.hub.on_status(session, &report).await
            }
        }
    }

    /// Release the session, if one was registered on this connection.
    ///
    /// The outbound receiver is dropped first. A command racing the
    /// disconnect then fails with a closed connection instead of sitting
    /// in a queue nobody will drain.
    pub async fn close(self, outbound: mpsc::Receiver<OutboundMessage>) {
        drop(outbound);
        if let Some(session) = &self.session {
            self.hub.on_disconnect(session).await;
        }
    }

    async fn register(&mut self, registration: Registration) -> HubResult<()> {
        // Re-registering on the same connection replaces the earlier
        // session without closing the connection.
        if let Some(previous) = self.session.take() {
            self.hub.on_disconnect(&previous).await;
        }

        let registered = self
            .hub
            .register(registration, self.outbound.clone(), self.closer.clone())
            .await;

        let ack = OutboundMessage::Registered {
            controller_id: registered.handle.controller_id.clone(),
            lockers: registered.lockers,
        };
        if let Err(e) = self.outbound.try_send(ack) {
            tracing::warn!(
                controller_id = %registered.handle.controller_id,
                error = %e,
                "Could not queue registration ack",
            );
        }
        self.session = Some(registered.handle);
        Ok(())
    }
}
