//! WebSocket connection and heartbeat loop.
//!
//! Connects to the hub's controller endpoint, registers, heartbeats on a
//! timer and answers commands with status reports. Reconnects with a
//! fixed delay whenever the connection drops.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rackhub_controllers::{InboundMessage, OutboundMessage};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::device::SimulatedDevice;

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run the simulator indefinitely.
///
/// Door state survives reconnects, so the registration sent after a
/// reconnect reflects whatever the previous session left behind.
pub async fn run(ws_url: &str, device: &mut SimulatedDevice, heartbeat_interval: Duration) {
    loop {
        tracing::info!(url = %ws_url, controller_id = device.controller_id(), "Connecting to hub");

        match connect_async(ws_url).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("WebSocket connected");
                run_session(ws_stream, device, heartbeat_interval).await;
                tracing::warn!("WebSocket session ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket connection failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Drive a single session: register, then heartbeat on a timer and answer
/// commands via `tokio::select!`.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    device: &mut SimulatedDevice,
    heartbeat_interval: Duration,
) {
    let (mut sink, mut stream) = ws_stream.split();

    if let Err(e) = send(&mut sink, &device.registration()).await {
        tracing::error!(error = %e, "Failed to register");
        return;
    }

    let mut ticker = tokio::time::interval(heartbeat_interval);
    // The registration counts as the first sign of life.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = send(&mut sink, &device.heartbeat()).await {
                    tracing::error!(error = %e, "Failed to send heartbeat");
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_incoming(device, &text) {
                            if let Err(e) = send(&mut sink, &reply).await {
                                tracing::error!(error = %e, "Failed to send status report");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Hub closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one hub frame and let the device react to it.
pub fn handle_incoming(device: &mut SimulatedDevice, text: &str) -> Option<InboundMessage> {
    match serde_json::from_str::<OutboundMessage>(text) {
        Ok(message) => device.respond(&message),
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unknown or malformed hub message");
            None
        }
    }
}

async fn send<S>(sink: &mut S, message: &InboundMessage) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize controller message");
            Ok(())
        }
    }
}
