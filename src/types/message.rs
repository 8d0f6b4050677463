//! Conversation and message type definitions

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Message role enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// A single prompt message sent to the chat-completion provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Database row representation for a conversation
#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub user_id: i64,
    pub guardian_slug: Option<String>,
    pub title: String,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// API representation for a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardian_slug: Option<String>,
    pub title: String,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            user_id: row.user_id,
            guardian_slug: row.guardian_slug,
            title: row.title,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row representation for a message
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub is_voice_input: bool,
    pub created_at: String,
}

/// API representation for a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub is_voice_input: bool,
    pub created_at: String,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role: MessageRole::from_str(&row.role),
            content: row.content,
            is_voice_input: row.is_voice_input,
            created_at: row.created_at,
        }
    }
}

/// Input for creating a conversation
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationInput {
    #[validate(length(min = 1, max = 64))]
    pub guardian_slug: Option<String>,
    #[validate(length(max = 256))]
    pub title: Option<String>,
}

/// Response for creating a conversation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCreated {
    pub id: i64,
    /// Lifetime conversation count for the user after this one
    pub new_total: i64,
    /// Whether `new_total` crossed an engagement milestone
    pub milestone: bool,
}

/// Conversation with its messages in chronological order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Request body for the streaming chat endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StreamChatRequest {
    pub conversation_id: i64,
    #[validate(length(min = 1, max = 8000))]
    pub message: String,
    #[serde(default)]
    pub is_voice_input: bool,
}

/// Outward SSE frame sent to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamFrame {
    Chunk(String),
    Done(String),
    Error(String),
}
