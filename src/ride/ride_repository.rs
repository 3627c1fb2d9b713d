use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ride_models::{RideParticipant, RideRole};
use crate::error::{AppError, Result};

/// Read-only view of the ride matching/booking record.
#[async_trait]
pub trait RideDirectory: Send + Sync {
    /// Eligible participants of a ride (driver plus booked passengers), or
    /// `None` when the ride does not exist.
    async fn participants(&self, ride_id: Uuid) -> Result<Option<Vec<RideParticipant>>>;
}

#[derive(Clone)]
pub struct RideRepository {
    pool: PgPool,
}

impl RideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    user_id: Uuid,
    role: String,
}

#[async_trait]
impl RideDirectory for RideRepository {
    async fn participants(&self, ride_id: Uuid) -> Result<Option<Vec<RideParticipant>>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            "SELECT driver_id AS user_id, 'driver' AS role FROM rides WHERE id = $1
             UNION ALL
             SELECT passenger_id AS user_id, 'passenger' AS role
             FROM ride_bookings
             WHERE ride_id = $1 AND status = 'confirmed'",
        )
        .bind(ride_id)
        .fetch_all(&self.pool)
        .await?;

        // Every ride has a driver row, so no rows means no ride.
        if rows.is_empty() {
            return Ok(None);
        }

        let participants = rows
            .into_iter()
            .map(|row| {
                let role = row.role.parse::<RideRole>().map_err(|e| {
                    tracing::error!("Corrupt ride record {}: {}", ride_id, e);
                    AppError::InternalError
                })?;
                Ok(RideParticipant {
                    user_id: row.user_id,
                    role,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(participants))
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Fixed ride records for tests.
    #[derive(Default)]
    pub struct StaticRides {
        rides: RwLock<HashMap<Uuid, Vec<RideParticipant>>>,
    }

    impl StaticRides {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_ride(&self, ride_id: Uuid, driver: Uuid, passengers: &[Uuid]) {
            let mut participants = vec![RideParticipant {
                user_id: driver,
                role: RideRole::Driver,
            }];
            participants.extend(passengers.iter().map(|&user_id| RideParticipant {
                user_id,
                role: RideRole::Passenger,
            }));
            self.rides.write().unwrap().insert(ride_id, participants);
        }
    }

    #[async_trait]
    impl RideDirectory for StaticRides {
        async fn participants(&self, ride_id: Uuid) -> Result<Option<Vec<RideParticipant>>> {
            Ok(self.rides.read().unwrap().get(&ride_id).cloned())
        }
    }
}
