//! Service layer for the coaching server
//!
//! Services hold the business rules and sit between the HTTP handlers and
//! the repositories or the upstream completion API.

pub mod chat_completion;
pub mod chat_service;
pub mod stream_relay;
pub mod usage_service;

use crate::error::{AppError, AppResult};

pub use chat_completion::{ChatCompletionProvider, ChatError, OpenAiChatProvider};
pub use chat_service::ChatService;
pub use stream_relay::{RelayEvent, RelayStream, SseDecoder};
pub use usage_service::{UsageError, UsageService};

/// Run synchronous storage work on tokio's blocking pool, off the async workers
pub async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}
