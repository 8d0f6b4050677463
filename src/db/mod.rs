//! Database layer for Coach Server
//!
//! This module provides database connection management, migrations,
//! and repository implementations for all data access.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{init_database, open_pool, DbError, DbPool, DbResult};
pub use repositories::{ConversationRepository, MessageRepository, UsageRepository};

/// Fixed-width RFC 3339 timestamp so stored values sort lexicographically
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
