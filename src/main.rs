mod auth;
mod conversation;
mod db;
mod error;
mod message;
mod middleware;
mod presentation;
mod ride;
mod routes;
mod state;
mod websocket;

use conversation::{
    ConversationDirectory, ConversationRepository, ConversationService, ServiceSettings,
};
use db::{create_pool, run_migrations};
use message::MessageRepository;
use ride::RideRepository;
use routes::create_router;
use state::{AppState, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use websocket::ConnectionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ride_chat=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    tracing::info!("Connecting to database...");
    let db = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    tracing::info!("Running migrations...");
    run_migrations(&db).await?;

    // Create repositories
    let conversation_repository = Arc::new(ConversationRepository::new(db.clone()));
    let message_repository = Arc::new(MessageRepository::new(db.clone()));
    let ride_repository = Arc::new(RideRepository::new(db.clone()));

    // Live connection registry, drained on shutdown
    let ws_connections = ConnectionManager::new(config.ws_outbound_buffer);

    // Create services
    let directory = ConversationDirectory::new(conversation_repository, ride_repository);
    let conversation_service = ConversationService::new(
        directory,
        message_repository,
        ws_connections.clone(),
        ServiceSettings::from(config.as_ref()),
    );

    // Create application state
    let state = AppState {
        config: config.clone(),
        conversation_service,
        ws_connections: ws_connections.clone(),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = config.bind_addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ws_connections))
        .await?;

    db.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(ws_connections: ConnectionManager) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {:?}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing live connections");
    ws_connections.close_all();
}
