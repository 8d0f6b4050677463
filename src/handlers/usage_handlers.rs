//! Usage HTTP handlers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::auth::CurrentUser;
use crate::services::run_blocking;
use crate::types::{
    ActionKind, ActionTypeCount, QuotaCheck, Tier, TopUserUsage, UsageLogEntry, UsageOverview,
    UserUsage,
};
use crate::AppState;

const DEFAULT_TOP_USERS: usize = 20;
const DEFAULT_LOG_LIMIT: usize = 100;
const DEFAULT_ACTION_DAYS: u32 = 7;

#[derive(Debug, Deserialize)]
pub struct CanPerformQuery {
    pub action: ActionKind,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SetTierInput {
    pub tier: Tier,
}

/// Get the caller's counters, or `null` before their first action
pub async fn get_my_usage(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> AppResult<Json<Option<UserUsage>>> {
    let usage = run_blocking(move || Ok(state.usage_service.get_usage(user.id)?)).await?;
    Ok(Json(usage))
}

/// Check whether the caller may perform an action today
pub async fn can_perform(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<CanPerformQuery>,
) -> AppResult<Json<QuotaCheck>> {
    let check =
        run_blocking(move || Ok(state.usage_service.check_quota(user.id, query.action)?)).await?;
    Ok(Json(check))
}

pub async fn usage_stats(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> AppResult<Json<UsageOverview>> {
    user.require_admin()?;
    let overview = run_blocking(move || Ok(state.usage_service.usage_overview()?)).await?;
    Ok(Json(overview))
}

pub async fn top_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<TopUserUsage>>> {
    user.require_admin()?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_USERS);
    let top = run_blocking(move || Ok(state.usage_service.top_users(limit)?)).await?;
    Ok(Json(top))
}

pub async fn user_logs(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<UsageLogEntry>>> {
    user.require_admin()?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let logs = run_blocking(move || Ok(state.usage_service.user_logs(user_id, limit)?)).await?;
    Ok(Json(logs))
}

pub async fn action_counts(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<DaysQuery>,
) -> AppResult<Json<Vec<ActionTypeCount>>> {
    user.require_admin()?;
    let days = query.days.unwrap_or(DEFAULT_ACTION_DAYS);
    let counts = run_blocking(move || Ok(state.usage_service.action_counts(days)?)).await?;
    Ok(Json(counts))
}

/// Move a user to another tier and return their updated counters
pub async fn set_tier(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    payload: Result<Json<SetTierInput>, JsonRejection>,
) -> AppResult<Json<UserUsage>> {
    user.require_admin()?;
    let Json(SetTierInput { tier }) = payload?;

    let usage = run_blocking(move || {
        if !state.usage_service.set_tier(user_id, tier)? {
            return Err(AppError::NotFound(format!("Usage for user {}", user_id)));
        }
        state
            .usage_service
            .get_usage(user_id)?
            .ok_or_else(|| AppError::NotFound(format!("Usage for user {}", user_id)))
    })
    .await?;

    tracing::info!(admin_id = user.id, user_id, tier = tier.as_str(), "Tier changed");
    Ok(Json(usage))
}
