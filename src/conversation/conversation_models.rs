use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Two distinct participants in a fixed order (`low < high`), so that an
/// unordered pair has exactly one representation in the uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    low: Uuid,
    high: Uuid,
}

impl CanonicalPair {
    pub fn new(a: Uuid, b: Uuid) -> Result<Self> {
        if a == b {
            return Err(AppError::NotEligible(
                "A user cannot start a conversation with themself".to_string(),
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: i64,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The participant that is not `viewer_id`, or `None` when the viewer is
    /// not part of this conversation.
    pub fn other_participant(&self, viewer_id: Uuid) -> Option<Uuid> {
        if viewer_id == self.participant_a {
            Some(self.participant_b)
        } else if viewer_id == self.participant_b {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let forward = CanonicalPair::new(u1, u2).unwrap();
        let backward = CanonicalPair::new(u2, u1).unwrap();

        assert_eq!(forward, backward);
        assert!(forward.low() < forward.high());
        assert_eq!(forward.low(), u1.min(u2));
        assert_eq!(forward.high(), u1.max(u2));
    }

    #[test]
    fn test_canonical_pair_rejects_self_chat() {
        let u1 = Uuid::new_v4();
        assert!(matches!(CanonicalPair::new(u1, u1), Err(AppError::NotEligible(_))));
    }

    #[test]
    fn test_other_participant() {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            participant_a: Uuid::from_u128(1),
            participant_b: Uuid::from_u128(2),
            created_at: now,
            last_activity_at: now,
            message_count: 0,
        };

        assert_eq!(conversation.other_participant(Uuid::from_u128(1)), Some(Uuid::from_u128(2)));
        assert_eq!(conversation.other_participant(Uuid::from_u128(2)), Some(Uuid::from_u128(1)));
        assert_eq!(conversation.other_participant(Uuid::from_u128(3)), None);
    }
}
