use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    conversation::conversation_dto::OpenConversationRequest,
    error::Result,
    message::{Cursor, MessagePageQuery, SendMessageRequest},
    middleware::AuthUser,
    presentation::{ConversationDetailView, ConversationSummaryView, MessagePageView, MessageView},
    state::AppState,
};

/// Open (get or create) the conversation with a co-rider
#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = OpenConversationRequest,
    responses(
        (
            status = 200,
            description = "Conversation with its first history page",
            body = ConversationDetailView
        ),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Not a participant of the ride"),
        (status = 404, description = "Ride not found"),
        (status = 422, description = "Pair not eligible for this ride")
    ),
    security(("bearer_auth" = []))
)]
pub async fn open_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse> {
    let detail = state
        .conversation_service
        .open_conversation(user_id, payload.ride_id, payload.counterpart_id)
        .await?;

    Ok((StatusCode::OK, Json(ConversationDetailView::for_viewer(&detail, user_id))))
}

/// List the current user's conversations, most recent activity first
#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    responses(
        (status = 200, description = "Inbox", body = Vec<ConversationSummaryView>),
        (status = 401, description = "Unauthenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let summaries = state
        .conversation_service
        .list_conversations_for(user_id)
        .await?;

    let views: Vec<ConversationSummaryView> = summaries
        .iter()
        .map(|summary| ConversationSummaryView::for_viewer(summary, user_id))
        .collect();

    Ok((StatusCode::OK, Json(views)))
}

/// Fetch a conversation by id
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    tag = "conversations",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (
            status = 200,
            description = "Conversation with its first history page",
            body = ConversationDetailView
        ),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state
        .conversation_service
        .get_conversation(user_id, conversation_id)
        .await?;

    Ok((StatusCode::OK, Json(ConversationDetailView::for_viewer(&detail, user_id))))
}

/// Page through a conversation's messages after a cursor
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(("id" = Uuid, Path, description = "Conversation id"), MessagePageQuery),
    responses(
        (status = 200, description = "Messages in order", body = MessagePageView),
        (status = 400, description = "Invalid cursor"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagePageQuery>,
) -> Result<impl IntoResponse> {
    let after = query.cursor.as_deref().map(Cursor::decode).transpose()?;

    let history = state
        .conversation_service
        .history(user_id, conversation_id, after, query.limit)
        .await?;

    let view = MessagePageView::for_viewer(
        &history.page,
        user_id,
        history.other_participant.role,
    );

    Ok((StatusCode::OK, Json(view)))
}

/// Send a message to a conversation
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and broadcast", body = MessageView),
        (status = 400, description = "Empty or invalid content"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state
        .conversation_service
        .send_message(user_id, conversation_id, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(MessageView::for_viewer(&message, user_id, None))))
}
