//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, ConnectionIdFactory, StoreError},
    infrastructure::{
        dto::websocket::{ClientEnvelope, ServerEvent},
        hub::OutboundFrame,
    },
    ui::state::AppState,
    usecase::{JoinError, ReactionError, SendMessageError, TypingError},
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // The connection is anonymous until a register_user_ws envelope arrives.
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that drains the connection's outbound channel into the
/// WebSocket sink.
///
/// A `Shutdown` frame (sent by the hub when a newer registration evicts this
/// connection) closes the socket, making the eviction observable to the peer.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Event(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Shutdown => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionIdFactory::generate();
    let (tx, rx) = mpsc::unbounded_channel();
    state.hub.add_connection(connection_id.clone(), tx).await;
    tracing::info!("Client connected to WebSocket as '{}'", connection_id);

    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);

    let recv_state = state.clone();
    let recv_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    dispatch_envelope(&recv_state, &recv_connection_id, &text).await;
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", recv_connection_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Cascading cleanup: registry, subscriptions, feeds, typing timers.
    state.disconnect_usecase.execute(&connection_id).await;
    tracing::info!("Client '{}' disconnected from WebSocket", connection_id);
}

/// Parse one inbound envelope and route it to its use case.
///
/// Every failure — malformed envelope, unknown type, missing field, missing
/// reference, collaborator error — is answered with an `error` event to the
/// originating connection only. The connection stays open and no state is
/// mutated beyond what the use case already committed.
async fn dispatch_envelope(state: &AppState, connection_id: &ConnectionId, text: &str) {
    let envelope = match serde_json::from_str::<ClientEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Failed to parse envelope: {}", e);
            send_error(
                state,
                connection_id,
                "Malformed message envelope.",
                Some(e.to_string()),
            )
            .await;
            return;
        }
    };

    match envelope {
        ClientEnvelope::RegisterUserWs { user_id, username } => {
            if let Err(e) = state
                .register_user_usecase
                .execute(connection_id, user_id, username)
                .await
            {
                send_error(state, connection_id, &e.to_string(), None).await;
            }
        }
        ClientEnvelope::JoinChat { group_id, user_id } => {
            if let Err(e) = state.join_group_usecase.execute(group_id, user_id).await {
                let (message, details) = match &e {
                    JoinError::Store(inner) => store_error_reply("join chat", inner),
                    other => (other.to_string(), None),
                };
                send_error(state, connection_id, &message, details).await;
            }
        }
        ClientEnvelope::SendMessage {
            group_id,
            sender_id,
            encrypted_content,
            reply_to_message_id,
        } => {
            if let Err(e) = state
                .send_message_usecase
                .execute(group_id, sender_id, encrypted_content, reply_to_message_id)
                .await
            {
                let (message, details) = match &e {
                    SendMessageError::Store(inner) => store_error_reply("send message", inner),
                    other => (other.to_string(), None),
                };
                send_error(state, connection_id, &message, details).await;
            }
        }
        ClientEnvelope::AddReaction {
            group_id,
            message_id,
            user_id,
            emoji,
        } => {
            if let Err(e) = state
                .reaction_usecase
                .add(group_id, message_id, user_id, emoji)
                .await
            {
                let (message, details) = match &e {
                    ReactionError::Store(inner) => store_error_reply("add reaction", inner),
                    other => (other.to_string(), None),
                };
                send_error(state, connection_id, &message, details).await;
            }
        }
        ClientEnvelope::RemoveReaction {
            group_id,
            message_id,
            user_id,
            emoji,
        } => {
            if let Err(e) = state
                .reaction_usecase
                .remove(group_id, message_id, user_id, emoji)
                .await
            {
                let (message, details) = match &e {
                    ReactionError::Store(inner) => store_error_reply("remove reaction", inner),
                    other => (other.to_string(), None),
                };
                send_error(state, connection_id, &message, details).await;
            }
        }
        ClientEnvelope::Typing {
            group_id,
            user_id,
            is_typing,
        } => {
            if let Err(e) = state
                .typing_usecase
                .clone()
                .handle(group_id, user_id, is_typing)
                .await
            {
                let (message, details) = match &e {
                    TypingError::Store(inner) => store_error_reply("update typing status", inner),
                    other => (other.to_string(), None),
                };
                send_error(state, connection_id, &message, details).await;
            }
        }
    }
}

/// Shape a store failure for the `error` event: reference misses become the
/// message itself, infrastructure failures keep a generic message with the
/// cause in `details`.
fn store_error_reply(action: &str, error: &StoreError) -> (String, Option<String>) {
    match error {
        StoreError::UserNotFound(_)
        | StoreError::GroupNotFound(_)
        | StoreError::MessageNotFound(_)
        | StoreError::UsernameTaken(_) => (error.to_string(), None),
        StoreError::Unavailable(_) => (format!("Failed to {}.", action), Some(error.to_string())),
    }
}

/// Reply an `error` event to the originating connection only.
async fn send_error(
    state: &AppState,
    connection_id: &ConnectionId,
    message: &str,
    details: Option<String>,
) {
    let event = ServerEvent::Error {
        message: message.to_string(),
        details,
    };
    let json = serde_json::to_string(&event).unwrap();
    if !state.hub.push_to_connection(connection_id, &json).await {
        tracing::debug!("Connection '{}' is gone, dropping error reply", connection_id);
    }
}
