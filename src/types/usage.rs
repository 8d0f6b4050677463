//! Usage counter type definitions

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "basic" => Tier::Basic,
            "premium" => Tier::Premium,
            _ => Tier::Free,
        }
    }
}

/// Kind of action tracked by the usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Conversation,
    Message,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Conversation => "conversation",
            ActionKind::Message => "message",
        }
    }
}

/// Action types recorded in the usage log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageActionType {
    ConversationStart,
    MessageSent,
    CardDrawn,
    ApexSession,
    VoiceInput,
}

impl UsageActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageActionType::ConversationStart => "conversation_start",
            UsageActionType::MessageSent => "message_sent",
            UsageActionType::CardDrawn => "card_drawn",
            UsageActionType::ApexSession => "apex_session",
            UsageActionType::VoiceInput => "voice_input",
        }
    }
}

/// Canonical markers for the day, week and month containing an instant (UTC).
///
/// A counter whose stored marker differs from the matching field here belongs
/// to an earlier window and must be zeroed before it is incremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageWindows {
    /// `YYYY-MM-DD`
    pub daily: String,
    /// `YYYY-MM-DD` of the Monday starting the week
    pub weekly: String,
    /// `YYYY-MM`
    pub monthly: String,
}

impl UsageWindows {
    pub fn at(now: DateTime<Utc>) -> Self {
        let daily = now.format("%Y-%m-%d").to_string();
        let monthly = daily[..7].to_string();

        // Sunday is the last day of its week, so it maps back six days.
        let week_start =
            now.date_naive() - Duration::days(now.weekday().num_days_from_monday() as i64);
        let weekly = week_start.format("%Y-%m-%d").to_string();

        Self {
            daily,
            weekly,
            monthly,
        }
    }
}

/// Database row representation for a user's usage counters
#[derive(Debug, Clone)]
pub struct UserUsageRow {
    pub user_id: i64,
    pub tier: String,
    pub daily_conversations: i64,
    pub weekly_conversations: i64,
    pub monthly_conversations: i64,
    pub total_conversations: i64,
    pub daily_messages: i64,
    pub weekly_messages: i64,
    pub monthly_messages: i64,
    pub total_messages: i64,
    pub last_daily_reset: Option<String>,
    pub last_weekly_reset: Option<String>,
    pub last_monthly_reset: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// API representation of a user's usage counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUsage {
    pub user_id: i64,
    pub tier: Tier,
    pub daily_conversations: i64,
    pub weekly_conversations: i64,
    pub monthly_conversations: i64,
    pub total_conversations: i64,
    pub daily_messages: i64,
    pub weekly_messages: i64,
    pub monthly_messages: i64,
    pub total_messages: i64,
    pub last_daily_reset: Option<String>,
    pub last_weekly_reset: Option<String>,
    pub last_monthly_reset: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserUsage {
    /// Daily counter for the given action kind
    pub fn daily_count(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Conversation => self.daily_conversations,
            ActionKind::Message => self.daily_messages,
        }
    }

    /// Daily counter as seen at `windows`; a counter from an earlier day reads as zero
    pub fn daily_count_in(&self, kind: ActionKind, windows: &UsageWindows) -> i64 {
        if self.last_daily_reset.as_deref() == Some(windows.daily.as_str()) {
            self.daily_count(kind)
        } else {
            0
        }
    }

    /// Lifetime counter for the given action kind
    pub fn total_count(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Conversation => self.total_conversations,
            ActionKind::Message => self.total_messages,
        }
    }
}

impl From<UserUsageRow> for UserUsage {
    fn from(row: UserUsageRow) -> Self {
        UserUsage {
            user_id: row.user_id,
            tier: Tier::from_str(&row.tier),
            daily_conversations: row.daily_conversations,
            weekly_conversations: row.weekly_conversations,
            monthly_conversations: row.monthly_conversations,
            total_conversations: row.total_conversations,
            daily_messages: row.daily_messages,
            weekly_messages: row.weekly_messages,
            monthly_messages: row.monthly_messages,
            total_messages: row.total_messages,
            last_daily_reset: row.last_daily_reset,
            last_weekly_reset: row.last_weekly_reset,
            last_monthly_reset: row.last_monthly_reset,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Result of recording one action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Lifetime total for the recorded action kind after the increment
    pub new_total: i64,
    pub usage: UserUsage,
}

/// Daily limits for a single tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    pub daily_conversations: i64,
    pub daily_messages: i64,
}

impl TierLimits {
    pub fn daily_limit(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Conversation => self.daily_conversations,
            ActionKind::Message => self.daily_messages,
        }
    }
}

impl Default for TierLimits {
    fn default() -> Self {
        // Effectively unlimited until monetization is switched on
        Self {
            daily_conversations: 999,
            daily_messages: 9999,
        }
    }
}

/// Per-tier quota table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    pub free: TierLimits,
    pub basic: TierLimits,
    pub premium: TierLimits,
}

impl QuotaLimits {
    pub fn for_tier(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Basic => self.basic,
            Tier::Premium => self.premium,
        }
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl QuotaCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            current_count: None,
            limit: None,
        }
    }

    pub fn denied(kind: ActionKind, current_count: i64, limit: i64) -> Self {
        let what = match kind {
            ActionKind::Conversation => "conversation",
            ActionKind::Message => "message",
        };
        Self {
            allowed: false,
            reason: Some(format!("Daily {} limit reached ({})", what, limit)),
            current_count: Some(current_count),
            limit: Some(limit),
        }
    }
}

/// Input for appending a usage log entry
#[derive(Debug, Clone)]
pub struct NewUsageLog {
    pub user_id: i64,
    pub action_type: UsageActionType,
    pub guardian_slug: Option<String>,
    pub conversation_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl NewUsageLog {
    pub fn new(user_id: i64, action_type: UsageActionType) -> Self {
        Self {
            user_id,
            action_type,
            guardian_slug: None,
            conversation_id: None,
            metadata: None,
        }
    }

    pub fn with_guardian(mut self, slug: Option<String>) -> Self {
        self.guardian_slug = slug;
        self
    }

    pub fn with_conversation(mut self, conversation_id: i64) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// Database row representation for a usage log entry
#[derive(Debug, Clone)]
pub struct UsageLogRow {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    pub guardian_slug: Option<String>,
    pub conversation_id: Option<i64>,
    pub metadata: Option<String>, // JSON
    pub created_at: String,
}

/// API representation for a usage log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardian_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<UsageLogRow> for UsageLogEntry {
    fn from(row: UsageLogRow) -> Self {
        UsageLogEntry {
            id: row.id,
            user_id: row.user_id,
            action_type: row.action_type,
            guardian_slug: row.guardian_slug,
            conversation_id: row.conversation_id,
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: row.created_at,
        }
    }
}

/// Aggregate usage across all users
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageOverview {
    pub total_conversations: i64,
    pub total_messages: i64,
    pub free_users: i64,
    pub basic_users: i64,
    pub premium_users: i64,
    pub active_users_today: i64,
    pub today_conversations: i64,
    pub today_messages: i64,
    pub week_conversations: i64,
    pub week_messages: i64,
    pub month_conversations: i64,
    pub month_messages: i64,
    pub avg_messages_per_user: f64,
}

/// Row of the top-users report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUserUsage {
    pub user_id: i64,
    pub tier: Tier,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub daily_conversations: i64,
    pub daily_messages: i64,
}

/// Count of log entries for one action type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTypeCount {
    pub action_type: String,
    pub count: i64,
}
