use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OpenConversationRequest {
    pub ride_id: Uuid,
    pub counterpart_id: Uuid,
}
