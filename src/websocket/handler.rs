use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::{bearer_token, user_from_token},
    state::AppState,
    websocket::{
        connection::ConnectionId,
        types::{ClientMessage, ErrorPayload, SubscriptionPayload, WsMessage},
    },
};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Browsers cannot set headers on the upgrade request, so the token may
/// also come from `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let user_id = authenticate_upgrade(&headers, query.token.as_deref(), &state.config.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Identity for a live connection, from the header or the query token.
fn authenticate_upgrade(
    headers: &HeaderMap,
    query_token: Option<&str>,
    secret: &str,
) -> Result<Uuid> {
    let token = bearer_token(headers)
        .or(query_token)
        .ok_or_else(|| AppError::Unauthenticated("Missing credentials".to_string()))?;

    user_from_token(token, secret)
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, mut rx) = state.ws_connections.connect(user_id);

    // Spawn task to send queued frames to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to encode frame: {:?}", e),
            }
        }
        let _ = sender.close().await;
    });

    // Spawn task to receive messages from the WebSocket. It only stops
    // between frames, never while one is being processed.
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = &mut stop_rx => break,
                next = receiver.next() => next,
            };
            let Some(Ok(msg)) = next else {
                break;
            };

            match msg {
                Message::Text(text) => {
                    if let Err(e) =
                        process_client_message(&text, connection_id, user_id, &state_clone).await
                    {
                        tracing::debug!(%connection_id, "Rejected client message: {}", e);
                        state_clone
                            .ws_connections
                            .send_to(connection_id, WsMessage::Error(ErrorPayload::from(&e)));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            let _ = stop_tx.send(());
            let _ = recv_task.await;
        }
        _ = &mut recv_task => send_task.abort(),
    }

    state.ws_connections.disconnect(connection_id);
    tracing::info!("WebSocket connection closed for user {}", user_id);
}

/// Process incoming client messages
pub async fn process_client_message(
    text: &str,
    connection_id: ConnectionId,
    user_id: Uuid,
    state: &AppState,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::Subscribe { conversation_id } => {
            state
                .ws_connections
                .subscribe(connection_id, conversation_id, &state.conversation_service)
                .await?;
            state.ws_connections.send_to(
                connection_id,
                WsMessage::Subscribed(SubscriptionPayload { conversation_id }),
            );
        }
        ClientMessage::Unsubscribe => {
            if let Some(conversation_id) = state.ws_connections.unsubscribe(connection_id) {
                state.ws_connections.send_to(
                    connection_id,
                    WsMessage::Unsubscribed(SubscriptionPayload { conversation_id }),
                );
            }
        }
        ClientMessage::SendMessage {
            conversation_id,
            content,
        } => {
            let conversation_id = conversation_id
                .or_else(|| state.ws_connections.current_room(connection_id))
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "Name a conversation or subscribe to one before sending".to_string(),
                    )
                })?;

            // The echo to this connection arrives through the room broadcast.
            state
                .conversation_service
                .send_message(user_id, conversation_id, &content)
                .await?;
        }
        ClientMessage::Ping => {
            state.ws_connections.send_to(connection_id, WsMessage::Pong);
        }
    }

    Ok(())
}
