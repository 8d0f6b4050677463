//! Conversation repository for database operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{timestamp, DbPool, DbResult};
use crate::types::{Conversation, ConversationRow};

#[derive(Clone)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        user_id: i64,
        guardian_slug: Option<&str>,
        title: &str,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let conn = self.pool.get()?;
        let ts = timestamp(now);

        conn.execute(
            r#"
            INSERT INTO conversations (user_id, guardian_slug, title, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
        "#,
            params![user_id, guardian_slug, title, ts, ts],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Find a conversation owned by `user_id`
    pub fn find_for_user(&self, id: i64, user_id: i64) -> DbResult<Option<Conversation>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, guardian_slug, title, is_archived, created_at, updated_at
            FROM conversations WHERE id = ? AND user_id = ?
        "#,
        )?;

        let row = stmt
            .query_row(params![id, user_id], |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    guardian_slug: row.get(2)?,
                    title: row.get(3)?,
                    is_archived: row.get::<_, i32>(4)? != 0,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })
            .optional()?;

        Ok(row.map(Conversation::from))
    }

    pub fn update_title(&self, id: i64, title: &str, now: DateTime<Utc>) -> DbResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?",
            params![title, timestamp(now), id],
        )?;
        Ok(())
    }

    pub fn touch(&self, id: i64, now: DateTime<Utc>) -> DbResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE conversations SET updated_at = ? WHERE id = ?",
            params![timestamp(now), id],
        )?;
        Ok(())
    }
}
