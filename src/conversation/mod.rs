pub mod conversation_directory;
pub mod conversation_dto;
pub mod conversation_handlers;
pub mod conversation_models;
pub mod conversation_repository;
pub mod conversation_service;

#[cfg(test)]
pub mod memory_store;

pub use conversation_directory::ConversationDirectory;
pub use conversation_models::{CanonicalPair, Conversation};
pub use conversation_repository::{ConversationRepository, ConversationStore};
pub use conversation_service::{
    ConversationDetail, ConversationService, ConversationSummary, OtherParticipant,
    ServiceSettings,
};
