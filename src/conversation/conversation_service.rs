use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::conversation_directory::ConversationDirectory;
use super::conversation_models::Conversation;
use crate::{
    db::retry_read,
    error::{AppError, Result},
    message::{normalize_content, Cursor, Message, MessagePage, MessageStore},
    ride::{ride_models::role_of, RideParticipant, RideRole},
    state::Config,
    websocket::{ChatMessagePayload, ConnectionManager, MembershipCheck, WsMessage},
};

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub history_page_size: i64,
    pub max_page_size: i64,
    pub max_message_length: usize,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_page_size: config.history_page_size,
            max_page_size: config.max_page_size,
            max_message_length: config.max_message_length,
        }
    }
}

/// The participant a viewer is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OtherParticipant {
    pub user_id: Uuid,
    /// Role on the ride, when the ride record is still available.
    pub role: Option<RideRole>,
}

#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub history: MessagePage,
    pub other_participant: OtherParticipant,
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub counterpart_id: Uuid,
    pub counterpart_role: Option<RideRole>,
    pub last_message: Option<Message>,
}

/// A page of history with the participant the viewer is talking to.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    pub page: MessagePage,
    pub other_participant: OtherParticipant,
}

/// Get-or-create, authorization and message append, above the directory and
/// the message store. Every successful append is handed to the live gateway.
#[derive(Clone)]
pub struct ConversationService {
    directory: ConversationDirectory,
    messages: Arc<dyn MessageStore>,
    gateway: ConnectionManager,
    settings: ServiceSettings,
}

impl ConversationService {
    pub fn new(
        directory: ConversationDirectory,
        messages: Arc<dyn MessageStore>,
        gateway: ConnectionManager,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            directory,
            messages,
            gateway,
            settings,
        }
    }

    pub async fn open_conversation(
        &self,
        viewer_id: Uuid,
        ride_id: Uuid,
        counterpart_id: Uuid,
    ) -> Result<ConversationDetail> {
        let participants = self.directory.ride_participants(ride_id).await?;
        if role_of(&participants, viewer_id).is_none() {
            return Err(AppError::Unauthorized(
                "You are not a participant of this ride".to_string(),
            ));
        }

        let conversation = self
            .directory
            .resolve(ride_id, viewer_id, counterpart_id, &participants)
            .await?;

        let history = self.page(conversation.id, None, None).await?;

        Ok(ConversationDetail {
            other_participant: OtherParticipant {
                user_id: counterpart_id,
                role: role_of(&participants, counterpart_id),
            },
            conversation,
            history,
        })
    }

    pub async fn get_conversation(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<ConversationDetail> {
        let conversation = self.authorize_participant(viewer_id, conversation_id).await?;
        let other_participant = self.other_participant(&conversation, viewer_id).await?;
        let history = self.page(conversation.id, None, None).await?;

        Ok(ConversationDetail {
            conversation,
            history,
            other_participant,
        })
    }

    /// `list_since` for a participant, with the limit clamped to the
    /// configured bounds.
    pub async fn history(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> Result<ConversationHistory> {
        let conversation = self.authorize_participant(viewer_id, conversation_id).await?;
        let other_participant = self.other_participant(&conversation, viewer_id).await?;
        let page = self.page(conversation.id, after, limit).await?;

        Ok(ConversationHistory {
            page,
            other_participant,
        })
    }

    /// Append and broadcast run on their own task, so a caller that goes
    /// away mid-send does not roll the append back.
    pub async fn send_message(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let conversation = self.authorize_participant(viewer_id, conversation_id).await?;
        let content = normalize_content(content, self.settings.max_message_length)?;

        let messages = self.messages.clone();
        let gateway = self.gateway.clone();
        let append = tokio::spawn(async move {
            // Not retried: a failed append is surfaced so the client resends.
            let message = messages.append(conversation.id, viewer_id, &content).await?;

            // Only the committed record is broadcast.
            let delivered = gateway.publish(
                conversation.id,
                WsMessage::ChatMessage(ChatMessagePayload::from(&message)),
            );

            tracing::debug!(
                conversation_id = %conversation.id,
                message_id = %message.id,
                seq = message.seq,
                delivered,
                "Message appended"
            );

            Ok::<_, AppError>(message)
        });

        append.await.map_err(|e| {
            tracing::error!(%conversation_id, "Append task failed: {:?}", e);
            AppError::InternalError
        })?
    }

    /// Inbox: every conversation of the user with its latest message, most
    /// recent activity first.
    pub async fn list_conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let conversations = self.directory.list_for_user(user_id).await?;
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let mut latest = retry_read("latest_messages", || self.messages.latest_for(&ids)).await?;

        let mut rides: HashMap<Uuid, Option<Vec<RideParticipant>>> = HashMap::new();
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(counterpart_id) = conversation.other_participant(user_id) else {
                continue;
            };

            if !rides.contains_key(&conversation.ride_id) {
                let participants = self.known_participants(conversation.ride_id).await?;
                rides.insert(conversation.ride_id, participants);
            }
            let counterpart_role = rides
                .get(&conversation.ride_id)
                .and_then(|participants| participants.as_deref())
                .and_then(|participants| role_of(participants, counterpart_id));

            summaries.push(ConversationSummary {
                last_message: latest.remove(&conversation.id),
                counterpart_id,
                counterpart_role,
                conversation,
            });
        }

        Ok(summaries)
    }

    /// The conversation, if `viewer_id` is one of its two participants.
    pub async fn authorize_participant(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation> {
        let conversation = self.directory.find(conversation_id).await?;
        if !conversation.has_participant(viewer_id) {
            return Err(AppError::Unauthorized(
                "You are not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    async fn other_participant(
        &self,
        conversation: &Conversation,
        viewer_id: Uuid,
    ) -> Result<OtherParticipant> {
        let user_id = conversation
            .other_participant(viewer_id)
            .ok_or(AppError::InternalError)?;
        let role = self
            .known_participants(conversation.ride_id)
            .await?
            .and_then(|participants| role_of(&participants, user_id));

        Ok(OtherParticipant { user_id, role })
    }

    /// Ride participants, or `None` once the ride record is gone.
    async fn known_participants(&self, ride_id: Uuid) -> Result<Option<Vec<RideParticipant>>> {
        match self.directory.ride_participants(ride_id).await {
            Ok(participants) => Ok(Some(participants)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn page(
        &self,
        conversation_id: Uuid,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> Result<MessagePage> {
        let limit = limit
            .unwrap_or(self.settings.history_page_size)
            .clamp(1, self.settings.max_page_size);

        retry_read("list_since", || {
            self.messages.list_since(conversation_id, after, limit)
        })
        .await
    }
}

#[async_trait]
impl MembershipCheck for ConversationService {
    async fn ensure_participant(&self, user_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.authorize_participant(user_id, conversation_id)
            .await
            .map(|_| ())
    }
}
