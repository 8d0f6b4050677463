//! Message repository for database operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{timestamp, DbPool, DbResult};
use crate::types::{Message, MessageRole, MessageRow};

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        is_voice_input: row.get::<_, i32>(4)? != 0,
        created_at: row.get(5)?,
    })
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
        is_voice_input: bool,
        now: DateTime<Utc>,
    ) -> DbResult<Message> {
        let conn = self.pool.get()?;
        conn.execute(
            r#"
            INSERT INTO messages (conversation_id, role, content, is_voice_input, created_at)
            VALUES (?, ?, ?, ?, ?)
        "#,
            params![
                conversation_id,
                role.as_str(),
                content,
                is_voice_input as i32,
                timestamp(now)
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.find_by_id(id)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    pub fn find_by_id(&self, id: i64) -> DbResult<Option<Message>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, conversation_id, role, content, is_voice_input, created_at
                FROM messages WHERE id = ?
            "#,
                [id],
                message_from_row,
            )
            .optional()?;

        Ok(row.map(Message::from))
    }

    /// All messages of a conversation in chronological order
    pub fn find_by_conversation(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, conversation_id, role, content, is_voice_input, created_at
            FROM messages WHERE conversation_id = ? ORDER BY id ASC
        "#,
        )?;

        let rows = stmt.query_map([conversation_id], message_from_row)?;
        Ok(rows
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(Message::from)
            .collect())
    }

    /// The most recent `limit` messages, returned oldest first
    pub fn find_recent(&self, conversation_id: i64, limit: usize) -> DbResult<Vec<Message>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, conversation_id, role, content, is_voice_input, created_at
            FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT ?
        "#,
        )?;

        let rows = stmt.query_map(params![conversation_id, limit as i64], message_from_row)?;
        let mut messages: Vec<Message> = rows
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(Message::from)
            .collect();
        messages.reverse(); // Return in chronological order

        Ok(messages)
    }

    pub fn count_by_conversation(&self, conversation_id: i64) -> DbResult<i64> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
