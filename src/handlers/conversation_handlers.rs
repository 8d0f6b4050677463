//! Conversation HTTP handlers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppResult;
use crate::handlers::auth::CurrentUser;
use crate::services::run_blocking;
use crate::types::{ConversationCreated, ConversationDetail, CreateConversationInput};
use crate::AppState;

/// Create a conversation for the caller
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<CreateConversationInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ConversationCreated>)> {
    let Json(input) = payload?;
    let created =
        run_blocking(move || state.chat_service.create_conversation(user.id, input)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get one of the caller's conversations with its messages
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ConversationDetail>> {
    run_blocking(move || state.chat_service.get_conversation(user.id, id))
        .await
        .map(Json)
}
