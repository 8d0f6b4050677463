//! HTTP handlers
//!
//! This module contains the axum handlers called by the web frontend and the
//! router that mounts them.

pub mod auth;
pub mod chat_handlers;
pub mod conversation_handlers;
pub mod usage_handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use auth::{CurrentUser, Role};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/stats", get(usage_handlers::usage_stats))
        .route("/top-users", get(usage_handlers::top_users))
        .route("/users/:id/logs", get(usage_handlers::user_logs))
        .route("/users/:id/tier", put(usage_handlers::set_tier))
        .route("/action-counts", get(usage_handlers::action_counts));

    let api = Router::new()
        .route(
            "/conversations",
            post(conversation_handlers::create_conversation),
        )
        .route(
            "/conversations/:id",
            get(conversation_handlers::get_conversation),
        )
        .route("/chat/stream", post(chat_handlers::stream_chat))
        .route("/usage/me", get(usage_handlers::get_my_usage))
        .route("/usage/can-perform", get(usage_handlers::can_perform))
        .nest("/admin/usage", admin);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
