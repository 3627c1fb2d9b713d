use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::conversation_models::{CanonicalPair, Conversation};
use crate::error::{AppError, Result};

/// Durable conversation records keyed by `(ride_id, canonical pair)`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn find_by_key(&self, ride_id: Uuid, pair: CanonicalPair) -> Result<Option<Conversation>>;

    /// Create the conversation for a key. Fails with `Conflict` when another
    /// writer already holds the key; the store's uniqueness constraint, not an
    /// in-process lock, decides the winner.
    async fn insert(&self, ride_id: Uuid, pair: CanonicalPair) -> Result<Conversation>;

    /// Conversations the user takes part in, most recent activity first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>>;
}

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_by_key(
        &self,
        ride_id: Uuid,
        pair: CanonicalPair,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations
             WHERE ride_id = $1 AND participant_a = $2 AND participant_b = $3",
        )
        .bind(ride_id)
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn insert(&self, ride_id: Uuid, pair: CanonicalPair) -> Result<Conversation> {
        let now = Utc::now().trunc_subsecs(6);

        sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations
                (id, ride_id, participant_a, participant_b, created_at, last_activity_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (ride_id, participant_a, participant_b) DO NOTHING
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(ride_id)
        .bind(pair.low())
        .bind(pair.high())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("Conversation already exists".to_string()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations
             WHERE participant_a = $1 OR participant_b = $1
             ORDER BY last_activity_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }
}
