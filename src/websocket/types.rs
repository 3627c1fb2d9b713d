use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, message::Message};

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    ChatMessage(ChatMessagePayload),
    Subscribed(SubscriptionPayload),
    Unsubscribed(SubscriptionPayload),
    Pong,
    Error(ErrorPayload),
}

/// A durable message as pushed to live connections. Clients order by
/// `(created_at, id)` or `seq`, never by arrival.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessagePayload {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Resume point for `list_since` after a reconnect.
    pub cursor: String,
}

impl From<&Message> for ChatMessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            seq: message.seq,
            sender_id: message.sender_id,
            content: message.content.clone(),
            created_at: message.created_at,
            cursor: message.cursor().encode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionPayload {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
    pub code: String,
}

impl From<&AppError> for ErrorPayload {
    fn from(err: &AppError) -> Self {
        let message = match err {
            // Store details stay in the server log.
            AppError::Database(_) => "Database error occurred".to_string(),
            other => other.to_string(),
        };
        Self {
            message,
            code: err.code().to_string(),
        }
    }
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { conversation_id: Uuid },
    Unsubscribe,
    /// Sends to `conversation_id`, or to the subscribed conversation when
    /// it is omitted.
    SendMessage {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        content: String,
    },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let id = Uuid::new_v4();
        let parsed: ClientMessage =
            serde_json::from_value(json!({"type": "subscribe", "conversation_id": id})).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::Subscribe { conversation_id } if conversation_id == id
        ));

        let parsed: ClientMessage =
            serde_json::from_value(json!({"type": "send_message", "content": "hi"})).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::SendMessage { conversation_id: None, ref content } if content == "hi"
        ));

        let parsed: ClientMessage = serde_json::from_value(
            json!({"type": "send_message", "conversation_id": id, "content": "hi"}),
        )
        .unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::SendMessage { conversation_id: Some(target), .. } if target == id
        ));

        let parsed: ClientMessage = serde_json::from_value(json!({"type": "unsubscribe"})).unwrap();
        assert!(matches!(parsed, ClientMessage::Unsubscribe));

        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "shout"})).is_err());
    }

    #[test]
    fn test_server_frames_are_tagged() {
        let pong = serde_json::to_value(WsMessage::Pong).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));

        let err = WsMessage::Error(ErrorPayload::from(&AppError::EmptyContent));
        let value = serde_json::to_value(err).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "empty_content");
    }
}
