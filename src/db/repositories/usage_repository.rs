//! Usage repository for database operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use crate::db::{timestamp, DbPool, DbResult};
use crate::types::{
    ActionKind, ActionTypeCount, NewUsageLog, Tier, TopUserUsage, UsageLogEntry, UsageLogRow,
    UsageOverview, UsageWindows, UserUsage, UserUsageRow,
};

const USAGE_COLUMNS: &str = r#"user_id, tier,
    daily_conversations, weekly_conversations, monthly_conversations, total_conversations,
    daily_messages, weekly_messages, monthly_messages, total_messages,
    last_daily_reset, last_weekly_reset, last_monthly_reset, created_at, updated_at"#;

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UserUsageRow> {
    Ok(UserUsageRow {
        user_id: row.get(0)?,
        tier: row.get(1)?,
        daily_conversations: row.get(2)?,
        weekly_conversations: row.get(3)?,
        monthly_conversations: row.get(4)?,
        total_conversations: row.get(5)?,
        daily_messages: row.get(6)?,
        weekly_messages: row.get(7)?,
        monthly_messages: row.get(8)?,
        total_messages: row.get(9)?,
        last_daily_reset: row.get(10)?,
        last_weekly_reset: row.get(11)?,
        last_monthly_reset: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<UsageLogRow> {
    Ok(UsageLogRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        action_type: row.get(2)?,
        guardian_slug: row.get(3)?,
        conversation_id: row.get(4)?,
        metadata: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub struct UsageRepository {
    pool: DbPool,
}

impl UsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fetch the stored counters as-is, without applying any rollover
    pub fn find_by_user(&self, user_id: i64) -> DbResult<Option<UserUsage>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM user_usage WHERE user_id = ?", USAGE_COLUMNS);
        let row = conn
            .query_row(&sql, [user_id], usage_from_row)
            .optional()?;

        Ok(row.map(UserUsage::from))
    }

    /// Roll stale windows over and count one action, atomically.
    ///
    /// The row is created on first use. Reset and increment happen in a single
    /// `UPDATE`, so concurrent writers on the same user cannot lose updates or
    /// double-apply a reset.
    pub fn record_action(
        &self,
        user_id: i64,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> DbResult<UserUsage> {
        let windows = UsageWindows::at(now);
        let ts = timestamp(now);
        let (conv_inc, msg_inc): (i64, i64) = match kind {
            ActionKind::Conversation => (1, 0),
            ActionKind::Message => (0, 1),
        };

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"
            INSERT INTO user_usage (user_id, tier, last_daily_reset, last_weekly_reset, last_monthly_reset, created_at, updated_at)
            VALUES (?1, 'free', ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (user_id) DO NOTHING
        "#,
            params![user_id, windows.daily, windows.weekly, windows.monthly, ts],
        )?;

        let sql = format!(
            r#"
            UPDATE user_usage SET
                daily_conversations   = (CASE WHEN last_daily_reset = ?2 THEN daily_conversations ELSE 0 END) + ?5,
                daily_messages        = (CASE WHEN last_daily_reset = ?2 THEN daily_messages ELSE 0 END) + ?6,
                weekly_conversations  = (CASE WHEN last_weekly_reset = ?3 THEN weekly_conversations ELSE 0 END) + ?5,
                weekly_messages       = (CASE WHEN last_weekly_reset = ?3 THEN weekly_messages ELSE 0 END) + ?6,
                monthly_conversations = (CASE WHEN last_monthly_reset = ?4 THEN monthly_conversations ELSE 0 END) + ?5,
                monthly_messages      = (CASE WHEN last_monthly_reset = ?4 THEN monthly_messages ELSE 0 END) + ?6,
                total_conversations   = total_conversations + ?5,
                total_messages        = total_messages + ?6,
                last_daily_reset = ?2,
                last_weekly_reset = ?3,
                last_monthly_reset = ?4,
                updated_at = ?7
            WHERE user_id = ?1
            RETURNING {}
        "#,
            USAGE_COLUMNS
        );

        let row = tx.query_row(
            &sql,
            params![
                user_id,
                windows.daily,
                windows.weekly,
                windows.monthly,
                conv_inc,
                msg_inc,
                ts
            ],
            usage_from_row,
        )?;

        tx.commit()?;

        Ok(UserUsage::from(row))
    }

    pub fn set_tier(&self, user_id: i64, tier: Tier, now: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE user_usage SET tier = ?, updated_at = ? WHERE user_id = ?",
            params![tier.as_str(), timestamp(now), user_id],
        )?;
        Ok(updated)
    }

    pub fn insert_log(&self, entry: &NewUsageLog, now: DateTime<Utc>) -> DbResult<i64> {
        let conn = self.pool.get()?;
        let metadata = entry.metadata.as_ref().map(|m| m.to_string());

        conn.execute(
            r#"
            INSERT INTO usage_logs (user_id, action_type, guardian_slug, conversation_id, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
            params![
                entry.user_id,
                entry.action_type.as_str(),
                entry.guardian_slug,
                entry.conversation_id,
                metadata,
                timestamp(now)
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn find_logs_by_user(&self, user_id: i64, limit: usize) -> DbResult<Vec<UsageLogEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, action_type, guardian_slug, conversation_id, metadata, created_at
            FROM usage_logs WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?
        "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], log_from_row)?;
        let logs = rows
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(UsageLogEntry::from)
            .collect();

        Ok(logs)
    }

    pub fn count_actions_since(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<ActionTypeCount>> {
        let conn = self.pool.get()?;
        let since = timestamp(now - Duration::days(days as i64));
        let mut stmt = conn.prepare(
            r#"
            SELECT action_type, COUNT(*) FROM usage_logs
            WHERE created_at >= ?
            GROUP BY action_type ORDER BY COUNT(*) DESC, action_type
        "#,
        )?;

        let rows = stmt.query_map([since], |row| {
            Ok(ActionTypeCount {
                action_type: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Aggregate counters across users. Period sums only include rows whose
    /// marker matches the window containing `now`.
    pub fn overview(&self, now: DateTime<Utc>) -> DbResult<UsageOverview> {
        let conn = self.pool.get()?;
        let windows = UsageWindows::at(now);

        let (total_conversations, total_messages, free_users, basic_users, premium_users) = conn
            .query_row(
                r#"
                SELECT
                    COALESCE(SUM(total_conversations), 0),
                    COALESCE(SUM(total_messages), 0),
                    COALESCE(SUM(CASE WHEN tier = 'free' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN tier = 'basic' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN tier = 'premium' THEN 1 ELSE 0 END), 0)
                FROM user_usage
            "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )?;

        let (active_users_today, today_conversations, today_messages) = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(daily_conversations), 0), COALESCE(SUM(daily_messages), 0)
            FROM user_usage WHERE last_daily_reset = ?
        "#,
            [&windows.daily],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let (week_conversations, week_messages) = conn.query_row(
            r#"
            SELECT COALESCE(SUM(weekly_conversations), 0), COALESCE(SUM(weekly_messages), 0)
            FROM user_usage WHERE last_weekly_reset = ?
        "#,
            [&windows.weekly],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (month_conversations, month_messages) = conn.query_row(
            r#"
            SELECT COALESCE(SUM(monthly_conversations), 0), COALESCE(SUM(monthly_messages), 0)
            FROM user_usage WHERE last_monthly_reset = ?
        "#,
            [&windows.monthly],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let user_count = free_users + basic_users + premium_users;
        let avg_messages_per_user = if user_count > 0 {
            total_messages as f64 / user_count as f64
        } else {
            0.0
        };

        Ok(UsageOverview {
            total_conversations,
            total_messages,
            free_users,
            basic_users,
            premium_users,
            active_users_today,
            today_conversations,
            today_messages,
            week_conversations,
            week_messages,
            month_conversations,
            month_messages,
            avg_messages_per_user,
        })
    }

    pub fn top_users(&self, limit: usize) -> DbResult<Vec<TopUserUsage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, tier, total_conversations, total_messages, daily_conversations, daily_messages
            FROM user_usage ORDER BY total_messages DESC, user_id LIMIT ?
        "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let tier: String = row.get(1)?;
            Ok(TopUserUsage {
                user_id: row.get(0)?,
                tier: Tier::from_str(&tier),
                total_conversations: row.get(2)?,
                total_messages: row.get(3)?,
                daily_conversations: row.get(4)?,
                daily_messages: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
