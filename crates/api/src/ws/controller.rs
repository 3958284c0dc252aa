//! Controller WebSocket endpoint.
//!
//! Every text frame is handed to a [`ControllerLink`]; whatever the hub
//! queues on the link's outbound channel is written back as JSON. The
//! connection is dropped when the hub cancels the link (superseded,
//! timed out, or shutdown).
//!
//! [`ControllerLink`]: rackhub_controllers::ControllerLink

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::ConnectionRole;

/// How long the sender task may take to flush a final Close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// GET /api/v1/ws/controller
pub async fn controller_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_controller_socket(socket, state))
}

async fn handle_controller_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Controller socket connected");

    let ws_manager = state.ws_manager.clone();
    let mut rx = ws_manager
        .add(conn_id.clone(), ConnectionRole::Controller, None)
        .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Controller sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let (mut link, mut outbound_rx) = state.hub.open_link();
    let closer = link.closer();

    loop {
        tokio::select! {
            () = closer.cancelled() => {
                tracing::info!(conn_id = %conn_id, "Hub closed controller connection");
                ws_manager.send(&conn_id, Message::Close(None)).await;
                break;
            }
            Some(outbound) = outbound_rx.recv() => {
                let text = outbound.to_json();
                if !ws_manager.send(&conn_id, Message::Text(text.into())).await {
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = link.on_text(text.as_str()).await {
                        tracing::warn!(conn_id = %conn_id, error = %e, "Dropped controller message");
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!(conn_id = %conn_id, "Ignoring binary controller frame");
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Ping/pong received");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Controller receive error");
                    break;
                }
            }
        }
    }

    let controller_id = link.session().map(|s| s.controller_id.to_string());
    link.close(outbound_rx).await;

    // Removing the connection drops the last sender, so the sender task
    // finishes once it has flushed what is queued.
    ws_manager.remove(&conn_id).await;
    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    tracing::info!(
        conn_id = %conn_id,
        controller_id = controller_id.as_deref().unwrap_or("-"),
        "Controller socket disconnected",
    );
}
