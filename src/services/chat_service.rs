//! Chat service coordinating conversations, usage accounting and the
//! completion provider

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::config::SystemPrompts;
use crate::db::{ConversationRepository, DbPool, MessageRepository};
use crate::error::{AppError, AppResult, ResultExt};
use crate::services::chat_completion::{ChatCompletionProvider, ChatError};
use crate::services::run_blocking;
use crate::services::stream_relay::{self, RelayStream};
use crate::services::usage_service::{is_milestone, UsageService};
use crate::types::{
    ActionKind, ChatMessage, ConversationCreated, ConversationDetail, CreateConversationInput,
    Message, MessageRole, NewUsageLog, StreamChatRequest, UsageActionType,
};

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";
pub const EMPTY_REPLY_FALLBACK: &str = "I'm here with you. What would you like to explore?";
const TITLE_MAX_CHARS: usize = 50;

#[derive(Clone)]
pub struct ChatService {
    conversation_repo: ConversationRepository,
    message_repo: MessageRepository,
    usage_service: Arc<UsageService>,
    provider: Arc<dyn ChatCompletionProvider>,
    system_prompts: Arc<SystemPrompts>,
    history_window: usize,
}

impl ChatService {
    pub fn new(
        pool: DbPool,
        usage_service: Arc<UsageService>,
        provider: Arc<dyn ChatCompletionProvider>,
        system_prompts: SystemPrompts,
        history_window: usize,
    ) -> Self {
        Self {
            conversation_repo: ConversationRepository::new(pool.clone()),
            message_repo: MessageRepository::new(pool),
            usage_service,
            provider,
            system_prompts: Arc::new(system_prompts),
            history_window,
        }
    }

    /// Start a conversation and count it against the user's usage
    pub fn create_conversation(
        &self,
        user_id: i64,
        input: CreateConversationInput,
    ) -> AppResult<ConversationCreated> {
        input.validate()?;

        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);

        let id = self.conversation_repo.create(
            user_id,
            input.guardian_slug.as_deref(),
            title,
            Utc::now(),
        )?;

        let log = NewUsageLog::new(user_id, UsageActionType::ConversationStart)
            .with_guardian(input.guardian_slug)
            .with_conversation(id);
        let outcome = self
            .usage_service
            .record_and_log(ActionKind::Conversation, &log)?;

        tracing::info!(user_id, conversation_id = id, "Conversation created");

        Ok(ConversationCreated {
            id,
            new_total: outcome.new_total,
            milestone: is_milestone(outcome.new_total),
        })
    }

    /// Get a conversation owned by `user_id` with its messages
    pub fn get_conversation(&self, user_id: i64, id: i64) -> AppResult<ConversationDetail> {
        let conversation = self
            .conversation_repo
            .find_for_user(id, user_id)?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {}", id)))?;

        let messages = self.message_repo.find_by_conversation(id)?;

        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    /// Persist the user's turn and open the assistant reply stream.
    ///
    /// Only a missing provider credential fails the call; every other
    /// provider failure is delivered as the stream's terminal event.
    pub async fn begin_stream(
        &self,
        user_id: i64,
        request: StreamChatRequest,
    ) -> AppResult<RelayStream> {
        let service = self.clone();
        let (conversation_id, prompt) =
            run_blocking(move || service.prepare_turn(user_id, request)).await?;

        match self.provider.stream_chat(prompt).await {
            Ok(stream) => Ok(stream),
            Err(ChatError::MissingCredentials) => Err(ChatError::MissingCredentials.into()),
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Chat completion request failed");
                Ok(stream_relay::failed(e))
            }
        }
    }

    /// Store the user's message, count it, and build the prompt for the provider
    fn prepare_turn(
        &self,
        user_id: i64,
        request: StreamChatRequest,
    ) -> AppResult<(i64, Vec<ChatMessage>)> {
        request.validate()?;

        let conversation = self
            .conversation_repo
            .find_for_user(request.conversation_id, user_id)?
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {}", request.conversation_id))
            })?;

        let now = Utc::now();
        self.message_repo.create(
            conversation.id,
            MessageRole::User,
            &request.message,
            request.is_voice_input,
            now,
        )?;

        let action_type = if request.is_voice_input {
            UsageActionType::VoiceInput
        } else {
            UsageActionType::MessageSent
        };
        let log = NewUsageLog::new(user_id, action_type)
            .with_guardian(conversation.guardian_slug.clone())
            .with_conversation(conversation.id);
        self.usage_service
            .record_and_log(ActionKind::Message, &log)?;

        let history = self
            .message_repo
            .find_recent(conversation.id, self.history_window)?;
        let system_prompt = self
            .system_prompts
            .for_guardian(conversation.guardian_slug.as_deref());
        let prompt = build_prompt(system_prompt, &history);

        if self.message_repo.count_by_conversation(conversation.id)? <= 1 {
            self.conversation_repo.update_title(
                conversation.id,
                &derive_title(&request.message),
                now,
            )?;
        }

        Ok((conversation.id, prompt))
    }

    /// Save the finished assistant reply
    pub fn complete_stream(&self, conversation_id: i64, text: &str) -> AppResult<Message> {
        let content = if text.is_empty() {
            EMPTY_REPLY_FALLBACK
        } else {
            text
        };

        let now = Utc::now();
        let message = self
            .message_repo
            .create(conversation_id, MessageRole::Assistant, content, false, now)
            .with_context(|| format!("Failed to save reply for conversation {}", conversation_id))?;

        self.conversation_repo.touch(conversation_id, now)?;

        Ok(message)
    }
}

fn build_prompt(system_prompt: &str, history: &[Message]) -> Vec<ChatMessage> {
    let mut prompt = Vec::with_capacity(history.len() + 1);
    prompt.push(ChatMessage::new(MessageRole::System, system_prompt));
    prompt.extend(
        history
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.as_str())),
    );
    prompt
}

/// Title for a conversation: the opening message as typed, cut to 50 characters
pub fn derive_title(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();

    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
