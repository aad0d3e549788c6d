//! Realtime WebSocket Routes
//!
//! `/ws` carries the request/notification protocol; `/time` streams the
//! server clock.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::server::AppState;
use crate::realtime::protocol::{self, ServerMessage};
use crate::realtime::SessionId;

/// Create realtime routes
pub fn realtime_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/time", get(time_handler))
        .with_state(state)
}

// ==================
// Session Socket
// ==================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (session, mut outbox) = match state.router.on_connect() {
        Ok(registered) => registered,
        Err(e) => {
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: e.close_code(),
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            outbound = outbox.next() => {
                let Some(message) = outbound else {
                    // deregistered: slow consumer or server shutdown
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "session closed".into(),
                        })))
                        .await;
                    break;
                };
                if !send_message(&mut sender, &message, session).await {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    state.router.on_message(session, &text);
                }
                Some(Ok(Message::Binary(data))) => {
                    state.router.on_binary(session, &data);
                }
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            },
            _ = shutdown.changed() => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    state.router.on_disconnect(session);
}

async fn send_message<S>(sender: &mut S, message: &ServerMessage, session: SessionId) -> bool
where
    S: Sink<Message> + Unpin,
{
    match protocol::encode(message) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(session = %session, error = %e, "Failed to encode message");
            true
        }
    }
}

// ==================
// Clock Stream
// ==================

async fn time_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let interval = state.tick_interval;
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| handle_clock(socket, interval, shutdown))
}

async fn handle_clock(socket: WebSocket, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tick = ServerMessage::Time {
                    now: chrono::Utc::now().timestamp_millis(),
                };
                let Ok(text) = protocol::encode(&tick) else {
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = shutdown.changed() => break,
        }
    }

    debug!("Clock stream closed");
}
