use crate::{
    conversation::{
        conversation_dto::OpenConversationRequest, conversation_handlers, Conversation,
        OtherParticipant,
    },
    message::SendMessageRequest,
    middleware::auth_middleware,
    presentation::{ConversationDetailView, ConversationSummaryView, MessagePageView, MessageView},
    ride::RideRole,
    state::AppState,
    websocket::ws_handler,
};
use axum::{
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        conversation_handlers::open_conversation,
        conversation_handlers::list_conversations,
        conversation_handlers::get_conversation,
        conversation_handlers::list_messages,
        conversation_handlers::send_message,
    ),
    components(
        schemas(
            OpenConversationRequest,
            SendMessageRequest,
            Conversation,
            OtherParticipant,
            RideRole,
            MessageView,
            MessagePageView,
            ConversationDetailView,
            ConversationSummaryView,
        )
    ),
    tags(
        (name = "conversations", description = "Ride conversations and messages")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (auth required)
    let conversation_routes = Router::new()
        .route(
            "/",
            get(conversation_handlers::list_conversations)
                .post(conversation_handlers::open_conversation),
        )
        .route("/:id", get(conversation_handlers::get_conversation))
        .route(
            "/:id/messages",
            get(conversation_handlers::list_messages).post(conversation_handlers::send_message),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // The live channel authenticates during the upgrade itself
    let api_routes = Router::new()
        .nest("/conversations", conversation_routes)
        .route("/ws", get(ws_handler));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
