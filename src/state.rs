use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;

use crate::{conversation::ConversationService, websocket::ConnectionManager};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conversation_service: ConversationService,
    pub ws_connections: ConnectionManager,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub history_page_size: i64,
    pub max_page_size: i64,
    pub max_message_length: usize,
    pub ws_outbound_buffer: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PORT", 3000)?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 5)?,
            history_page_size: env_or("HISTORY_PAGE_SIZE", 50)?,
            max_page_size: env_or("MAX_PAGE_SIZE", 200)?,
            max_message_length: env_or("MAX_MESSAGE_LENGTH", 2000)?,
            ws_outbound_buffer: env_or("WS_OUTBOUND_BUFFER", 64)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a number", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/ride_chat_test".to_string(),
            jwt_secret: "test_secret_key_for_testing_only".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            db_max_connections: 1,
            history_page_size: 50,
            max_page_size: 200,
            max_message_length: 2000,
            ws_outbound_buffer: 8,
        }
    }
}
