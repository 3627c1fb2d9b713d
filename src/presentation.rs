//! Viewer-relative shapes for stored records: who sent what, "is this me",
//! and display timestamps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    conversation::{Conversation, ConversationDetail, ConversationSummary, OtherParticipant},
    message::{Message, MessagePage},
    ride::RideRole,
};

const OWN_LABEL: &str = "You";
const UNKNOWN_ROLE_LABEL: &str = "Co-rider";

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    pub seq: i64,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_label: String,
    pub is_mine: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `HH:MM`, UTC.
    pub sent_at_display: String,
    /// e.g. `Mon 19 Oct 2026`.
    pub sent_on_display: String,
    pub cursor: String,
}

impl MessageView {
    pub fn for_viewer(
        message: &Message,
        viewer_id: Uuid,
        counterpart_role: Option<RideRole>,
    ) -> Self {
        let is_mine = message.sender_id == viewer_id;
        let sender_label = match (is_mine, counterpart_role) {
            (true, _) => OWN_LABEL.to_string(),
            (false, Some(role)) => role.to_string(),
            (false, None) => UNKNOWN_ROLE_LABEL.to_string(),
        };

        Self {
            id: message.id,
            seq: message.seq,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            sender_label,
            is_mine,
            content: message.content.clone(),
            created_at: message.created_at,
            sent_at_display: message.created_at.format("%H:%M").to_string(),
            sent_on_display: message.created_at.format("%a %d %b %Y").to_string(),
            cursor: message.cursor().encode(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagePageView {
    pub messages: Vec<MessageView>,
    /// Pass back as `cursor` to continue after the last returned message.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl MessagePageView {
    pub fn for_viewer(
        page: &MessagePage,
        viewer_id: Uuid,
        counterpart_role: Option<RideRole>,
    ) -> Self {
        Self {
            messages: page
                .messages
                .iter()
                .map(|m| MessageView::for_viewer(m, viewer_id, counterpart_role))
                .collect(),
            next_cursor: page.next_cursor.map(|c| c.encode()),
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationDetailView {
    pub conversation: Conversation,
    pub other_participant: OtherParticipant,
    pub history: MessagePageView,
}

impl ConversationDetailView {
    pub fn for_viewer(detail: &ConversationDetail, viewer_id: Uuid) -> Self {
        Self {
            conversation: detail.conversation.clone(),
            other_participant: detail.other_participant,
            history: MessagePageView::for_viewer(
                &detail.history,
                viewer_id,
                detail.other_participant.role,
            ),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationSummaryView {
    pub conversation_id: Uuid,
    pub ride_id: Uuid,
    pub counterpart_id: Uuid,
    pub counterpart_role: Option<RideRole>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: i64,
    pub last_message: Option<MessageView>,
}

impl ConversationSummaryView {
    pub fn for_viewer(summary: &ConversationSummary, viewer_id: Uuid) -> Self {
        Self {
            conversation_id: summary.conversation.id,
            ride_id: summary.conversation.ride_id,
            counterpart_id: summary.counterpart_id,
            counterpart_role: summary.counterpart_role,
            last_activity_at: summary.conversation.last_activity_at,
            message_count: summary.conversation.message_count,
            last_message: summary
                .last_message
                .as_ref()
                .map(|m| MessageView::for_viewer(m, viewer_id, summary.counterpart_role)),
        }
    }
}
