//! Live update channel over WebSocket
//!
//! The client logs in with its first message; afterwards every update event
//! matching its operations, on a target it can read, is pushed as JSON. The
//! user is reloaded per event and the socket closes once it is disabled or
//! removed.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::read::can_read_update;
use crate::models::update::Operation;
use crate::models::user::User;
use crate::server::state::ServerState;
use crate::updates::channel::UpdateEvent;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// First message sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsLoginMessage {
    pub token: String,

    /// Operations to receive; empty means all
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Control messages sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsControl {
    LoggedIn,
    Error { message: String },
}

/// `GET /ws/update`
pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<ServerState>, mut socket: WebSocket) {
    let Some((user, operations)) = login(&state, &mut socket).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    // subscribed before acknowledging so no event after LOGGED_IN is missed
    let mut subscription = state.app.channel.subscribe(operations);
    if send_json(&mut socket, &WsControl::LoggedIn).await.is_err() {
        return;
    }
    info!("User {} subscribed to live updates", user.id);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            event = subscription.recv() => {
                let Some(event) = event else {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                // access may have been revoked since login
                let current = match state.app.registry.users.get(&user.id).await {
                    Ok(Some(current)) if current.enabled => current,
                    Ok(_) => {
                        warn!("Closing live updates of user {}: no longer active", user.id);
                        let message = format!("user {} is no longer active", user.id);
                        let _ = send_json(&mut socket, &WsControl::Error { message }).await;
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(e) => {
                        warn!("Dropping event of update {}: {}", event.update_id, e);
                        continue;
                    }
                };
                if !visible(&state, &current, &event).await {
                    continue;
                }
                if send_json(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("WebSocket of user {} failed: {}", user.id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    info!("User {} unsubscribed from live updates", user.id);
}

async fn login(state: &ServerState, socket: &mut WebSocket) -> Option<(User, Vec<Operation>)> {
    let text = match tokio::time::timeout(LOGIN_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(_) => {
            warn!("WebSocket closed before login");
            return None;
        }
        Err(_) => {
            warn!("WebSocket login timed out");
            return None;
        }
    };

    let login = match serde_json::from_str::<WsLoginMessage>(text.as_str()) {
        Ok(login) => login,
        Err(e) => {
            reject(socket, format!("invalid login message: {}", e)).await;
            return None;
        }
    };
    match state.authenticate_token(&login.token).await {
        Ok(user) => Some((user, login.operations)),
        Err(e) => {
            reject(socket, e.to_string()).await;
            None
        }
    }
}

async fn reject(socket: &mut WebSocket, message: String) {
    warn!("WebSocket login rejected: {}", message);
    let _ = send_json(socket, &WsControl::Error { message }).await;
}

async fn visible(state: &ServerState, user: &User, event: &UpdateEvent) -> bool {
    match can_read_update(&state.app, user, &event.target, &event.operator).await {
        Ok(visible) => visible,
        Err(e) => {
            warn!("Dropping event of update {}: {}", event.update_id, e);
            false
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize WebSocket message: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}
