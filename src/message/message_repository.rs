use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::message_models::{next_message_timestamp, Cursor, Message, MessagePage};
use crate::error::{AppError, Result};

/// Durable, append-only, per-conversation ordered message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and advance the conversation's last activity as one
    /// atomic unit. Fails with `InvalidSender` when `sender_id` is not one of
    /// the two participants and `EmptyContent` when the content is blank.
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message>;

    /// Messages strictly after `after` in `(created_at, id)` order.
    async fn list_since(
        &self,
        conversation_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> Result<MessagePage>;

    /// Most recent message of each listed conversation that has one.
    async fn latest_for(&self, conversation_ids: &[Uuid]) -> Result<HashMap<Uuid, Message>>;
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AppendTarget {
    participant_a: Uuid,
    participant_b: Uuid,
    last_activity_at: DateTime<Utc>,
    message_count: i64,
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::EmptyContent);
        }

        let mut tx = self.pool.begin().await?;

        // The row lock serializes appends per conversation, so timestamps and
        // sequence numbers are assigned and committed in the same order.
        let target = sqlx::query_as::<_, AppendTarget>(
            "SELECT participant_a, participant_b, last_activity_at, message_count
             FROM conversations
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(conversation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if sender_id != target.participant_a && sender_id != target.participant_b {
            return Err(AppError::InvalidSender);
        }

        let created_at = next_message_timestamp(target.last_activity_at, Utc::now());
        let seq = target.message_count + 1;

        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (id, conversation_id, seq, sender_id, content, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(seq)
        .bind(sender_id)
        .bind(content)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations
             SET last_activity_at = $2, message_count = $3
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(created_at)
        .bind(seq)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(message)
    }

    async fn list_since(
        &self,
        conversation_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> Result<MessagePage> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages
             WHERE conversation_id = $1
               AND ($2::timestamptz IS NULL OR (created_at, id) > ($2, $3::uuid))
             ORDER BY created_at ASC, id ASC
             LIMIT $4",
        )
        .bind(conversation_id)
        .bind(after.map(|c| c.created_at))
        .bind(after.map(|c| c.id))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        Ok(MessagePage::from_rows(rows, after, limit))
    }

    async fn latest_for(&self, conversation_ids: &[Uuid]) -> Result<HashMap<Uuid, Message>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let messages = sqlx::query_as::<_, Message>(
            "SELECT DISTINCT ON (conversation_id) *
             FROM messages
             WHERE conversation_id = ANY($1)
             ORDER BY conversation_id, created_at DESC, id DESC",
        )
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages
            .into_iter()
            .map(|m| (m.conversation_id, m))
            .collect())
    }
}
