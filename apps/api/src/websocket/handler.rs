//! WebSocket upgrade handler and per-connection event loop
//!
//! Each accepted socket gets a fresh connection id, an outbound channel
//! registered in the connection directory, and two tasks: one forwarding
//! outbound events to the socket, one parsing and dispatching inbound
//! frames. Socket-level errors end only this connection; other
//! connections are never affected.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::services::DeviceService;

use super::connection::ConnectionDirectory;
use super::messages::{ClientEvent, ServerEvent};
use super::presence::PresenceTracker;
use super::sync::SyncHandler;

/// WebSocket upgrade handler
///
/// Authentication happens upstream at the identity-aware proxy; the
/// socket itself announces its user via the `user_connected` event.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(directory): Extension<ConnectionDirectory>,
    Extension(presence): Extension<PresenceTracker>,
    Extension(devices): Extension<DeviceService>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, directory, presence, devices))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    directory: ConnectionDirectory,
    presence: PresenceTracker,
    devices: DeviceService,
) {
    let connection_id = Uuid::new_v4();

    // Unbounded channel for events destined for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    directory.attach(connection_id, tx);

    tracing::info!(connection_id = %connection_id, "WebSocket connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let handler = SyncHandler::new(
        connection_id,
        directory.clone(),
        presence.clone(),
        devices.clone(),
    );

    // Forward outbound events to the socket, preserving send order
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(connection_id = %connection_id, "WebSocket send failed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize server event");
                }
            }
        }
    });

    // Parse and dispatch inbound frames
    let recv_handler = handler.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => recv_handler.handle(event).await,
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %e,
                            "Failed to parse client event"
                        );
                        recv_handler.report_invalid_message(e.to_string());
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "Received unsupported binary message"
                    );
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Handled by the transport; nothing to do
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then abort the other
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    handler.handle_disconnect().await;

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}
