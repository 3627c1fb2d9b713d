pub mod message_dto;
pub mod message_models;
pub mod message_repository;

pub use message_dto::{MessagePageQuery, SendMessageRequest};
pub use message_models::{normalize_content, Cursor, Message, MessagePage};
pub use message_repository::{MessageRepository, MessageStore};
