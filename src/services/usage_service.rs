//! Usage service for per-user activity counters and quota checks

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{DbPool, UsageRepository};
use crate::types::{
    ActionKind, ActionTypeCount, NewUsageLog, QuotaCheck, QuotaLimits, RecordOutcome, Tier,
    TopUserUsage, UsageLogEntry, UsageOverview, UsageWindows, UserUsage,
};

/// Lifetime conversation counts worth announcing
pub const CONVERSATION_MILESTONES: [i64; 7] = [10, 25, 50, 100, 200, 500, 1000];

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Database error: {0}")]
    Database(String),
}

pub struct UsageService {
    usage_repo: UsageRepository,
    limits: QuotaLimits,
}

impl UsageService {
    pub fn new(pool: DbPool, limits: QuotaLimits) -> Self {
        Self {
            usage_repo: UsageRepository::new(pool),
            limits,
        }
    }

    /// Count one action for `user_id`, rolling stale windows over first
    pub fn record_action(
        &self,
        user_id: i64,
        kind: ActionKind,
    ) -> Result<RecordOutcome, UsageError> {
        self.record_action_at(user_id, kind, Utc::now())
    }

    pub fn record_action_at(
        &self,
        user_id: i64,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, UsageError> {
        let usage = self
            .usage_repo
            .record_action(user_id, kind, now)
            .map_err(|e| UsageError::Database(e.to_string()))?;

        Ok(RecordOutcome {
            new_total: usage.total_count(kind),
            usage,
        })
    }

    /// Stored counters as of the last write; `None` if the user has no activity yet
    pub fn get_usage(&self, user_id: i64) -> Result<Option<UserUsage>, UsageError> {
        self.usage_repo
            .find_by_user(user_id)
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    /// Compare the user's daily counter against their tier limit
    pub fn check_quota(&self, user_id: i64, kind: ActionKind) -> Result<QuotaCheck, UsageError> {
        self.check_quota_at(user_id, kind, Utc::now())
    }

    /// Quota check as of `now`. Nothing is written; a daily counter left over
    /// from an earlier day counts as zero.
    pub fn check_quota_at(
        &self,
        user_id: i64,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, UsageError> {
        let Some(usage) = self.get_usage(user_id)? else {
            return Ok(QuotaCheck::allowed());
        };

        let limit = self.limits.for_tier(usage.tier).daily_limit(kind);
        let current = usage.daily_count_in(kind, &UsageWindows::at(now));

        if current >= limit {
            tracing::info!(
                user_id,
                action = kind.as_str(),
                current,
                limit,
                "Daily quota reached"
            );
            return Ok(QuotaCheck::denied(kind, current, limit));
        }

        Ok(QuotaCheck::allowed())
    }

    /// Append an audit entry
    pub fn log_action(&self, entry: &NewUsageLog) -> Result<i64, UsageError> {
        self.usage_repo
            .insert_log(entry, Utc::now())
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    /// Count an action and write its audit entry
    pub fn record_and_log(
        &self,
        kind: ActionKind,
        entry: &NewUsageLog,
    ) -> Result<RecordOutcome, UsageError> {
        let outcome = self.record_action(entry.user_id, kind)?;
        self.log_action(entry)?;

        if kind == ActionKind::Conversation && is_milestone(outcome.new_total) {
            tracing::info!(
                user_id = entry.user_id,
                total = outcome.new_total,
                "User reached conversation milestone"
            );
        }

        Ok(outcome)
    }

    pub fn usage_overview(&self) -> Result<UsageOverview, UsageError> {
        self.usage_repo
            .overview(Utc::now())
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    pub fn top_users(&self, limit: usize) -> Result<Vec<TopUserUsage>, UsageError> {
        self.usage_repo
            .top_users(limit)
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    pub fn user_logs(&self, user_id: i64, limit: usize) -> Result<Vec<UsageLogEntry>, UsageError> {
        self.usage_repo
            .find_logs_by_user(user_id, limit)
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    pub fn action_counts(&self, days: u32) -> Result<Vec<ActionTypeCount>, UsageError> {
        self.usage_repo
            .count_actions_since(days, Utc::now())
            .map_err(|e| UsageError::Database(e.to_string()))
    }

    /// Move an existing user to another tier; returns false if the user has no row yet
    pub fn set_tier(&self, user_id: i64, tier: Tier) -> Result<bool, UsageError> {
        self.usage_repo
            .set_tier(user_id, tier, Utc::now())
            .map(|updated| updated > 0)
            .map_err(|e| UsageError::Database(e.to_string()))
    }
}

pub fn is_milestone(total: i64) -> bool {
    CONVERSATION_MILESTONES.contains(&total)
}
