//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure for integration tests.

#![allow(dead_code)]


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use coach_server_lib::config::{AppConfig, SystemPrompts};
use coach_server_lib::db::{open_pool, DbPool};
use coach_server_lib::services::{ChatCompletionProvider, ChatService, UsageService};
use coach_server_lib::types::QuotaLimits;
use coach_server_lib::AppState;

static TEST_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const TEST_SYSTEM_PROMPT: &str = "You are a test coach.";
pub const TEST_SAGE_PROMPT: &str = "You are a wise test coach.";

pub fn test_prompts() -> SystemPrompts {
    SystemPrompts::new(TEST_SYSTEM_PROMPT).with_guardian("sage", TEST_SAGE_PROMPT)
}

/// Test context that holds all resources needed for testing
pub struct TestContext {
    /// Database connection pool
    pub pool: DbPool,
    /// Temporary directory holding the database file
    pub temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a fresh, migrated database
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_path = temp_dir.path().join(format!("test_db_{}.db", counter));

        let pool = open_pool(&db_path, 5).expect("Failed to open test database");

        Self { pool, temp_dir }
    }

    pub fn usage_service(&self) -> UsageService {
        UsageService::new(self.pool.clone(), QuotaLimits::default())
    }

    pub fn usage_service_with_limits(&self, limits: QuotaLimits) -> UsageService {
        UsageService::new(self.pool.clone(), limits)
    }

    pub fn chat_service(&self, provider: Arc<dyn ChatCompletionProvider>) -> ChatService {
        ChatService::new(
            self.pool.clone(),
            Arc::new(self.usage_service()),
            provider,
            test_prompts(),
            20,
        )
    }

    /// Application state as the server would build it
    pub fn app_state(&self, provider: Arc<dyn ChatCompletionProvider>) -> Arc<AppState> {
        let config = AppConfig {
            data_dir: self.temp_dir.path().to_path_buf(),
            system_prompts: test_prompts(),
            ..fixtures::config()
        };
        Arc::new(AppState::new(self.pool.clone(), config, provider))
    }

    /// Count rows in a table
    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = self.pool.get().expect("Failed to get connection");
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .expect("Failed to count rows")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
