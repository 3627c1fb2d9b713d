use std::sync::Arc;
use uuid::Uuid;

use super::conversation_models::{CanonicalPair, Conversation};
use super::conversation_repository::ConversationStore;
use crate::{
    db::retry_read,
    error::{AppError, Result},
    ride::{RideDirectory, RideParticipant},
};

const CREATE_ROUNDS: usize = 3;

/// Maps `(ride, participant pair)` to its single canonical conversation.
#[derive(Clone)]
pub struct ConversationDirectory {
    store: Arc<dyn ConversationStore>,
    rides: Arc<dyn RideDirectory>,
}

impl ConversationDirectory {
    pub fn new(store: Arc<dyn ConversationStore>, rides: Arc<dyn RideDirectory>) -> Self {
        Self { store, rides }
    }

    /// Return the conversation for this ride and unordered pair, creating it
    /// on first use. `participants` is the ride's current participant set;
    /// both ids must be in it.
    pub async fn resolve(
        &self,
        ride_id: Uuid,
        participant_a: Uuid,
        participant_b: Uuid,
        participants: &[RideParticipant],
    ) -> Result<Conversation> {
        let pair = CanonicalPair::new(participant_a, participant_b)?;

        let on_ride = |user_id: Uuid| participants.iter().any(|p| p.user_id == user_id);
        if !on_ride(pair.low()) || !on_ride(pair.high()) {
            return Err(AppError::NotEligible(
                "Both participants must belong to the ride".to_string(),
            ));
        }

        for round in 1..=CREATE_ROUNDS {
            if let Some(existing) = self.find_by_key(ride_id, pair).await? {
                return Ok(existing);
            }

            match self.store.insert(ride_id, pair).await {
                Ok(created) => {
                    tracing::info!(
                        conversation_id = %created.id,
                        ride_id = %ride_id,
                        "Created conversation"
                    );
                    return Ok(created);
                }
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(
                        ride_id = %ride_id,
                        round,
                        "Lost conversation creation race, looking up the winner"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(
            "Conversation creation did not settle".to_string(),
        ))
    }

    pub async fn find(&self, conversation_id: Uuid) -> Result<Conversation> {
        retry_read("find_conversation", || self.store.find_by_id(conversation_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        retry_read("list_conversations", || self.store.list_for_user(user_id)).await
    }

    /// Eligible participants of a ride; `NotFound` when the ride is unknown.
    pub async fn ride_participants(&self, ride_id: Uuid) -> Result<Vec<RideParticipant>> {
        retry_read("ride_participants", || self.rides.participants(ride_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
    }

    async fn find_by_key(
        &self,
        ride_id: Uuid,
        pair: CanonicalPair,
    ) -> Result<Option<Conversation>> {
        retry_read("find_conversation_by_key", || {
            self.store.find_by_key(ride_id, pair)
        })
        .await
    }
}
