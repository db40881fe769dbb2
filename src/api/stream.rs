//! WebSocket API for live event streaming
//!
//! A new connection starts unfiltered and receives every event. Clients
//! narrow the stream with `{"type":"subscribe","event_types":[...]}` (repeated
//! subscribes are additive) and check liveness with `{"type":"ping"}`.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use futures_util::{SinkExt, StreamExt};
use gotcha::axum::response::Response;
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionsConfig, Settings};
use crate::state::Connections;
use crate::ws::{ChannelConnection, ClientMessage, ConnectionRegistry, ServerMessage};

/// GET /ws
/// Stream broadcast events over WebSocket
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(connections): State<Connections>,
    State(settings): State<Settings>,
) -> Response {
    let registry = connections.0.clone();
    let config = settings.connections.clone();

    ws.on_upgrade(move |socket| handle_event_socket(socket, registry, config))
}

async fn handle_event_socket(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    config: ConnectionsConfig,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound queue drained by the writer task; the registry only sees the
    // sending half
    let (conn, mut outbound_rx) = ChannelConnection::new(config.buffer);
    let id = registry.connect(Arc::new(conn)).await;

    let heartbeat = config.heartbeat();
    let writer = tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat);
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        debug!("client gone, stopping writer");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        debug!("failed to send heartbeat, client gone");
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { event_types }) => {
                    if registry.subscribe(id, event_types).await.is_none() {
                        break;
                    }
                }
                Ok(ClientMessage::Ping) => match ServerMessage::Pong.to_json() {
                    Ok(json) => {
                        if registry.send_to(id, json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "failed to encode pong"),
                },
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "failed to parse client message");
                }
            },
            Ok(Message::Close(_)) => {
                debug!(connection_id = %id, "client sent close frame");
                break;
            }
            Ok(_) => {
                // Ping/pong frames are handled by axum
            }
            Err(e) => {
                debug!(connection_id = %id, error = %e, "websocket error");
                break;
            }
        }
    }

    registry.disconnect(id).await;
    writer.abort();
    info!(connection_id = %id, "websocket connection closed");
}
