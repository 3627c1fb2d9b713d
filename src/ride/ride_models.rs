use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RideRole {
    Driver,
    Passenger,
}

impl std::fmt::Display for RideRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RideRole::Driver => write!(f, "Driver"),
            RideRole::Passenger => write!(f, "Passenger"),
        }
    }
}

impl std::str::FromStr for RideRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driver" => Ok(RideRole::Driver),
            "passenger" => Ok(RideRole::Passenger),
            other => Err(format!("unknown ride role '{}'", other)),
        }
    }
}

/// One eligible participant of a ride, as reported by the booking system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RideParticipant {
    pub user_id: Uuid,
    pub role: RideRole,
}

pub fn role_of(participants: &[RideParticipant], user_id: Uuid) -> Option<RideRole> {
    participants
        .iter()
        .find(|p| p.user_id == user_id)
        .map(|p| p.role)
}
