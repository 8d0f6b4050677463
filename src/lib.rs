//! Coach Server - Rust Backend Library
//!
//! This library provides the backend for an AI coaching chat application:
//! conversations persisted in SQLite, assistant replies relayed from a
//! streaming chat-completion API, and per-user usage accounting.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod services;
pub mod types;

use std::sync::Arc;

use config::AppConfig;
use db::DbPool;
use services::{ChatCompletionProvider, ChatService, UsageService};

/// Application state shared across all HTTP handlers
pub struct AppState {
    /// Database connection pool
    pub pool: DbPool,
    pub config: AppConfig,
    /// Usage counters and quota checks
    pub usage_service: Arc<UsageService>,
    /// Conversation and streaming chat operations
    pub chat_service: Arc<ChatService>,
}

impl AppState {
    /// Wire the services on top of an open pool
    pub fn new(
        pool: DbPool,
        config: AppConfig,
        provider: Arc<dyn ChatCompletionProvider>,
    ) -> Self {
        let usage_service = Arc::new(UsageService::new(pool.clone(), config.quota.clone()));
        let chat_service = Arc::new(ChatService::new(
            pool.clone(),
            usage_service.clone(),
            provider,
            config.system_prompts.clone(),
            config.history_window,
        ));

        Self {
            pool,
            config,
            usage_service,
            chat_service,
        }
    }
}

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use types::*;
