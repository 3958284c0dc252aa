//! Observer WebSocket endpoint.
//!
//! Observers subscribe to per-locker notifications, or (with an `admin`
//! token passed as `?token=`) to the administrative group. Admin
//! observers may also issue `unlock`, `lock` and `reset` commands.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use rackhub_controllers::{Command, Delivery, HubError, LockerHub};
use rackhub_core::error::CoreError;
use rackhub_core::lock_state::{LockOrigin, LockState};
use rackhub_core::types::{ControllerId, DoorIndex, LockerId};
use rackhub_events::{Interest, Notification};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{validate_token, Claims};
use crate::error::AppError;
use crate::state::AppState;
use crate::ws::manager::{ConnectionRole, WsManager};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Frames an observer may send.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    SubscribeRack { rack_id: LockerId },
    UnsubscribeRack { rack_id: LockerId },
    SubscribeAdmin,
    Ping,
    Unlock { rack_id: LockerId },
    Lock { rack_id: LockerId },
    Reset { rack_id: LockerId },
}

/// Replies written back to an observer. Notifications are written as
/// serialized [`Notification`]s, not through this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverReply {
    Subscribed {
        rack_id: LockerId,
    },
    Unsubscribed {
        rack_id: LockerId,
    },
    AdminSubscribed,
    Pong,
    Error {
        message: String,
    },
    /// The controller's transport accepted the command.
    CommandSent {
        command: Command,
        rack_id: LockerId,
        controller_id: ControllerId,
        door_index: Option<DoorIndex>,
    },
    CommandError {
        command: String,
        rack_id: LockerId,
        code: String,
        error: String,
    },
    ResetApplied {
        rack_id: LockerId,
        state: LockState,
    },
}

impl ObserverReply {
    fn error(message: impl Into<String>) -> Self {
        ObserverReply::Error {
            message: message.into(),
        }
    }

    fn command_sent(delivery: Delivery) -> Self {
        ObserverReply::CommandSent {
            command: delivery.command,
            rack_id: delivery.locker_id,
            controller_id: delivery.controller_id,
            door_index: delivery.door_index,
        }
    }

    fn command_error(command: &str, rack_id: LockerId, err: HubError) -> Self {
        let (_, code, error) = AppError::Hub(err).classify();
        ObserverReply::CommandError {
            command: command.to_string(),
            rack_id,
            code: code.to_string(),
            error,
        }
    }

    fn into_message(self) -> Message {
        Message::Text(serde_json::to_string(&self).unwrap_or_default().into())
    }
}

// ---------------------------------------------------------------------------
// Upgrade
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ObserverParams {
    pub token: Option<String>,
}

/// GET /api/v1/ws/observer
///
/// A missing token opens an anonymous observer. A token that fails
/// validation is refused with 401 before the upgrade.
pub async fn observer_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ObserverParams>,
    State(state): State<AppState>,
) -> Response {
    let claims = match authenticate(&state, params.token.as_deref()) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    ws.on_upgrade(move |socket| handle_observer_socket(socket, state, claims))
        .into_response()
}

fn authenticate(state: &AppState, token: Option<&str>) -> Result<Option<Claims>, AppError> {
    let Some(token) = token else {
        return Ok(None);
    };
    let Some(jwt) = &state.config.jwt else {
        return Err(CoreError::Unauthorized("token authentication is not configured".into()).into());
    };
    validate_token(token, jwt)
        .map(Some)
        .map_err(|e| CoreError::Unauthorized(format!("invalid token: {e}")).into())
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

async fn handle_observer_socket(socket: WebSocket, state: AppState, claims: Option<Claims>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let is_admin = claims.as_ref().is_some_and(Claims::is_admin);
    let subject = claims.map(|c| c.sub);
    tracing::info!(conn_id = %conn_id, subject = ?subject, is_admin, "Observer connected");

    let ws_manager = state.ws_manager.clone();
    let mut rx = ws_manager
        .add(conn_id.clone(), ConnectionRole::Observer, subject)
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Observer sink closed");
                break;
            }
        }
    });

    let mut subscription = state.event_bus.subscribe(Interest::default());

    loop {
        tokio::select! {
            notification = subscription.recv() => match notification {
                Some(notification) => {
                    if !ws_manager.send(&conn_id, notification_message(&notification)).await {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let request = match serde_json::from_str::<ObserverRequest>(text.as_str()) {
                        Ok(request) => request,
                        Err(e) => {
                            tracing::warn!(conn_id = %conn_id, error = %e, "Malformed observer frame");
                            ws_manager
                                .send(&conn_id, ObserverReply::error(format!("malformed request: {e}")).into_message())
                                .await;
                            continue;
                        }
                    };
                    let reply = handle_request(
                        request,
                        is_admin,
                        subscription.interest_mut(),
                        &state.hub,
                        &ws_manager,
                        &conn_id,
                    );
                    if let Some(reply) = reply {
                        ws_manager.send(&conn_id, reply.into_message()).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Observer receive error");
                    break;
                }
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Observer disconnected");
}

/// Apply one observer request.
///
/// Subscription changes answer immediately. Commands run on their own
/// task, since they hold the locker's guard across delivery, and answer
/// through the connection's channel when done.
fn handle_request(
    request: ObserverRequest,
    is_admin: bool,
    interest: &mut Interest,
    hub: &Arc<LockerHub>,
    ws_manager: &Arc<WsManager>,
    conn_id: &str,
) -> Option<ObserverReply> {
    match request {
        ObserverRequest::Ping => Some(ObserverReply::Pong),
        ObserverRequest::SubscribeRack { rack_id } => {
            interest.add_locker(rack_id.clone());
            Some(ObserverReply::Subscribed { rack_id })
        }
        ObserverRequest::UnsubscribeRack { rack_id } => {
            interest.remove_locker(&rack_id);
            Some(ObserverReply::Unsubscribed { rack_id })
        }
        ObserverRequest::SubscribeAdmin => {
            if !is_admin {
                return Some(ObserverReply::error("administrative access requires an admin token"));
            }
            interest.set_admin(true);
            Some(ObserverReply::AdminSubscribed)
        }
        ObserverRequest::Unlock { rack_id }
        | ObserverRequest::Lock { rack_id }
        | ObserverRequest::Reset { rack_id }
            if !is_admin =>
        {
            Some(ObserverReply::error(format!(
                "commands for locker {rack_id} require an admin token"
            )))
        }
        command => {
            let hub = hub.clone();
            let ws_manager = ws_manager.clone();
            let conn_id = conn_id.to_string();
            tokio::spawn(async move {
                let reply = run_command(&hub, command).await;
                ws_manager.send(&conn_id, reply.into_message()).await;
            });
            None
        }
    }
}

async fn run_command(hub: &LockerHub, request: ObserverRequest) -> ObserverReply {
    match request {
        ObserverRequest::Unlock { rack_id } => match hub.unlock(&rack_id, LockOrigin::Admin).await {
            Ok(delivery) => ObserverReply::command_sent(delivery),
            Err(e) => ObserverReply::command_error(Command::Unlock.as_str(), rack_id, e),
        },
        ObserverRequest::Lock { rack_id } => match hub.lock(&rack_id, LockOrigin::Admin).await {
            Ok(delivery) => ObserverReply::command_sent(delivery),
            Err(e) => ObserverReply::command_error(Command::Lock.as_str(), rack_id, e),
        },
        ObserverRequest::Reset { rack_id } => match hub.reset(&rack_id).await {
            Ok(state) => ObserverReply::ResetApplied { rack_id, state },
            Err(e) => ObserverReply::command_error("reset", rack_id, e),
        },
        other => ObserverReply::error(format!("not a command: {other:?}")),
    }
}

fn notification_message(notification: &Notification) -> Message {
    Message::Text(serde_json::to_string(notification).unwrap_or_default().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_type() {
        let request: ObserverRequest =
            serde_json::from_str(r#"{"type":"subscribe_rack","rack_id":"L1"}"#).unwrap();
        assert_eq!(
            request,
            ObserverRequest::SubscribeRack {
                rack_id: LockerId::from("L1")
            }
        );

        let request: ObserverRequest = serde_json::from_str(r#"{"type":"subscribe_admin"}"#).unwrap();
        assert_eq!(request, ObserverRequest::SubscribeAdmin);
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        assert!(serde_json::from_str::<ObserverRequest>(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn command_error_carries_http_code() {
        let reply = ObserverReply::command_error(
            "unlock",
            LockerId::from("L1"),
            HubError::NotAvailable {
                locker_id: LockerId::from("L1"),
                state: LockState::Occupied,
            },
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "command_error");
        assert_eq!(json["code"], "NOT_AVAILABLE");
        assert_eq!(json["command"], "unlock");
    }
}
