use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// Transport ceiling; the configured message length limit is enforced
    /// after trimming.
    #[validate(length(max = 20000))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessagePageQuery {
    /// Opaque cursor from a previous page; omit to start from the beginning.
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}
