//! Repository implementations for data access

pub mod conversation_repository;
pub mod message_repository;
pub mod usage_repository;

pub use conversation_repository::ConversationRepository;
pub use message_repository::MessageRepository;
pub use usage_repository::UsageRepository;
