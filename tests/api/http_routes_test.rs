//! HTTP router integration tests

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use coach_server_lib::handlers::{self, auth::USER_ID_HEADER, auth::USER_ROLE_HEADER};
use coach_server_lib::services::ChatCompletionProvider;
use coach_server_lib::types::StreamFrame;

use common::mocks::ScriptedChatProvider;
use common::TestContext;

fn app(ctx: &TestContext, provider: impl ChatCompletionProvider + 'static) -> Router {
    handlers::router(ctx.app_state(Arc::new(provider)))
}

fn request(
    method: Method,
    uri: &str,
    user: Option<(&str, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header(USER_ID_HEADER, id)
            .header(USER_ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, req).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Parse the `data:` lines of an SSE body into frames
fn sse_frames(body: &[u8]) -> Vec<StreamFrame> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

async fn create_conversation(app: &Router, user: &str) -> i64 {
    let (status, body) = send_json(
        app,
        request(
            Method::POST,
            "/api/conversations",
            Some((user, "user")),
            Some(json!({ "guardianSlug": "sage" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));

    let (status, body) = send_json(&app, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));

    let (status, body) = send_json(&app, request(Method::GET, "/api/usage/me", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_and_fetch_conversation() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));

    let id = create_conversation(&app, "1").await;

    let (status, body) = send_json(
        &app,
        request(Method::GET, &format!("/api/conversations/{}", id), Some(("1", "user")), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["guardianSlug"], "sage");
    assert_eq!(body["title"], "New Conversation");
    assert_eq!(body["messages"], json!([]));

    let (status, body) = send_json(
        &app,
        request(Method::GET, &format!("/api/conversations/{}", id), Some(("2", "user")), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_chat_stream_frames_and_persistence() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&["You ", "are ", "doing well."]));
    let id = create_conversation(&app, "3").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/chat/stream",
            Some(("3", "user")),
            Some(json!({ "conversationId": id, "message": "How am I doing?" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let frames = sse_frames(&body);
    assert_eq!(
        frames,
        vec![
            StreamFrame::Chunk("You ".into()),
            StreamFrame::Chunk("are ".into()),
            StreamFrame::Chunk("doing well.".into()),
            StreamFrame::Done("You are doing well.".into()),
        ]
    );

    let (_, detail) = send_json(
        &app,
        request(Method::GET, &format!("/api/conversations/{}", id), Some(("3", "user")), None),
    )
    .await;
    assert_eq!(detail["title"], "How am I doing?");
    assert_eq!(detail["messages"][1]["role"], "assistant");
    assert_eq!(detail["messages"][1]["content"], "You are doing well.");
}

#[tokio::test]
async fn test_chat_stream_upstream_failure_sends_error_frame() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::upstream_status(500));
    let id = create_conversation(&app, "4").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/chat/stream",
            Some(("4", "user")),
            Some(json!({ "conversationId": id, "message": "hello" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_frames(&body),
        vec![StreamFrame::Error("Failed to generate response".into())]
    );
    // Only the user's turn was stored
    assert_eq!(ctx.count_rows("messages"), 1);
}

#[tokio::test]
async fn test_chat_stream_without_credentials_is_unavailable() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::missing_credentials());
    let id = create_conversation(&app, "5").await;

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/api/chat/stream",
            Some(("5", "user")),
            Some(json!({ "conversationId": id, "message": "hello" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_chat_stream_rejects_empty_message() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&["unused"]));
    let id = create_conversation(&app, "6").await;

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/api/chat/stream",
            Some(("6", "user")),
            Some(json!({ "conversationId": id, "message": "" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_json_uses_error_body() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&["unused"]));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/chat/stream")
        .header(USER_ID_HEADER, "6")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"conversationId\": "))
        .unwrap();
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].is_string());

    let (status, body) = send_json(
        &app,
        request(
            Method::POST,
            "/api/conversations",
            Some(("6", "user")),
            Some(json!({ "guardianSlug": 42 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_usage_me_and_can_perform() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));

    let (status, body) =
        send_json(&app, request(Method::GET, "/api/usage/me", Some(("7", "user")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    create_conversation(&app, "7").await;

    let (_, body) =
        send_json(&app, request(Method::GET, "/api/usage/me", Some(("7", "user")), None)).await;
    assert_eq!(body["userId"], 7);
    assert_eq!(body["dailyConversations"], 1);
    assert_eq!(body["tier"], "free");

    let (status, body) = send_json(
        &app,
        request(
            Method::GET,
            "/api/usage/can-perform?action=message",
            Some(("7", "user")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["reason"], Value::Null);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));

    for uri in [
        "/api/admin/usage/stats",
        "/api/admin/usage/top-users",
        "/api/admin/usage/users/1/logs",
        "/api/admin/usage/action-counts",
    ] {
        let (status, body) =
            send_json(&app, request(Method::GET, uri, Some(("8", "user")), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_admin_reports() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));
    create_conversation(&app, "20").await;
    create_conversation(&app, "20").await;
    create_conversation(&app, "21").await;

    let admin = Some(("1", "admin"));

    let (status, stats) =
        send_json(&app, request(Method::GET, "/api/admin/usage/stats", admin, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalConversations"], 3);
    assert_eq!(stats["freeUsers"], 2);

    let (_, top) = send_json(
        &app,
        request(Method::GET, "/api/admin/usage/top-users?limit=1", admin, None),
    )
    .await;
    assert_eq!(top.as_array().unwrap().len(), 1);

    let (_, logs) = send_json(
        &app,
        request(Method::GET, "/api/admin/usage/users/20/logs", admin, None),
    )
    .await;
    assert_eq!(logs.as_array().unwrap().len(), 2);
    assert_eq!(logs[0]["actionType"], "conversation_start");

    let (_, counts) = send_json(
        &app,
        request(Method::GET, "/api/admin/usage/action-counts?days=1", admin, None),
    )
    .await;
    assert_eq!(counts, json!([{ "actionType": "conversation_start", "count": 3 }]));
}

#[tokio::test]
async fn test_admin_sets_tier() {
    let ctx = TestContext::new();
    let app = app(&ctx, ScriptedChatProvider::replying(&[]));
    create_conversation(&app, "30").await;

    let (status, body) = send_json(
        &app,
        request(
            Method::PUT,
            "/api/admin/usage/users/30/tier",
            Some(("30", "user")),
            Some(json!({ "tier": "premium" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send_json(
        &app,
        request(
            Method::PUT,
            "/api/admin/usage/users/30/tier",
            Some(("1", "admin")),
            Some(json!({ "tier": "premium" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], 30);
    assert_eq!(body["tier"], "premium");
    assert_eq!(body["totalConversations"], 1);

    let (status, body) = send_json(
        &app,
        request(
            Method::PUT,
            "/api/admin/usage/users/31/tier",
            Some(("1", "admin")),
            Some(json!({ "tier": "basic" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send_json(
        &app,
        request(
            Method::PUT,
            "/api/admin/usage/users/30/tier",
            Some(("1", "admin")),
            Some(json!({ "tier": "gold" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
