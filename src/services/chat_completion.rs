//! Chat completion provider for streaming assistant replies

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::OpenAiConfig;
use crate::services::stream_relay::{relay, RelayStream};
use crate::types::ChatMessage;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Chat completion API key is not configured")]
    MissingCredentials,
    #[error("Chat completion API error: {status} - {body}")]
    Upstream { status: u16, body: String },
    #[error("Chat completion transport error: {0}")]
    Transport(String),
}

/// Source of streamed assistant replies
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Start a streaming completion for `messages`.
    ///
    /// Errors returned here happen before any delta could be produced; errors
    /// after that point arrive as a terminal event on the stream.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<RelayStream, ChatError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_completion_tokens: u32,
    temperature: f32,
    stream: bool,
}

pub struct OpenAiChatProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiChatProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatProvider {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<RelayStream, ChatError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ChatError::MissingCredentials)?;

        let body = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
            max_completion_tokens: self.config.max_completion_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream { status, body });
        }

        tracing::debug!(model = %self.config.model, "Chat completion stream opened");

        Ok(relay(response.bytes_stream()))
    }
}
