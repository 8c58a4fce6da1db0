//! WebSocket handler: one connection per client per topic.
//!
//! The connection registers with its topic's hub, then a single select loop
//! forwards queued frames to the socket and reads inbound frames only to
//! notice a disconnect. Whichever side ends first, the connection is
//! unregistered on the way out. A write the peer does not accept within
//! `SEND_TIMEOUT` also ends the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::AppState;
use crate::sync::{SyncHub, Topic};

/// A peer that does not accept a frame within this long is disconnected.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a socket write finished successfully before `limit`.
async fn delivered_within<F, E>(send: F, limit: Duration) -> bool
where
    F: Future<Output = Result<(), E>>,
{
    matches!(tokio::time::timeout(limit, send).await, Ok(Ok(())))
}

/// GET /sync/{topic}
pub(super) async fn handler_ws(
    ws: WebSocketUpgrade,
    AxumPath(topic): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let topic: Topic = match topic.parse() {
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };
    let hub = state.tracker.hubs().hub(topic).clone();
    ws.on_upgrade(move |socket| ws_loop(socket, hub))
}

async fn ws_loop(mut socket: WebSocket, hub: SyncHub) {
    let mut subscription = match hub.subscribe().await {
        Ok(s) => s,
        Err(e) => {
            warn!(topic = %hub.topic(), error = %e, "failed to register sync connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = subscription.id;
    debug!(topic = %hub.topic(), connection = id, "sync connection opened");

    loop {
        tokio::select! {
            frame = subscription.outbound.recv() => {
                match frame {
                    Some(frame) => {
                        let send = socket.send(Message::Text(frame.to_string().into()));
                        if !delivered_within(send, SEND_TIMEOUT).await {
                            debug!(topic = %hub.topic(), connection = id, "peer stalled or gone, closing");
                            break;
                        }
                    }
                    // The hub dropped this connection.
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    if let Err(e) = hub.unregister(id).await {
        debug!(topic = %hub.topic(), connection = id, error = %e, "unregister after close failed");
    }
    debug!(topic = %hub.topic(), connection = id, "sync connection closed");
}
